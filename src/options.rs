use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::backoff::{
    ConstantBackoffGenerator, ExponentialBackoffGenerator, ExponentialConfig, ExponentialOption,
    NoBackoffGenerator,
};
use crate::{Error, Result, RetryOption};

/// Retry behaviour as plain data, for config files and the environment.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum number of retries after the initial attempt; `0` leaves the
    /// limit to the backoff strategy.
    pub max_retries: u64,
    /// Delay strategy between attempts.
    pub backoff: BackoffSettings,
}

/// Delay strategy, tagged by `kind`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffSettings {
    Exponential(ExponentialSettings),
    Constant(ConstantSettings),
    None,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self::Exponential(ExponentialSettings::default())
    }
}

/// Exponential backoff in milliseconds.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExponentialSettings {
    pub initial_interval_ms: u64,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub max_interval_ms: u64,
    /// `0` disables the elapsed-time limit.
    pub max_elapsed_ms: u64,
}

impl Default for ExponentialSettings {
    fn default() -> Self {
        let config = ExponentialConfig::default();
        Self {
            initial_interval_ms: config.initial_interval.as_millis() as u64,
            multiplier: config.multiplier,
            randomization_factor: config.randomization_factor,
            max_interval_ms: config.max_interval.as_millis() as u64,
            max_elapsed_ms: config.max_elapsed_time.as_millis() as u64,
        }
    }
}

impl ExponentialSettings {
    pub fn options(&self) -> Vec<ExponentialOption> {
        vec![
            ExponentialOption::InitialInterval(Duration::from_millis(self.initial_interval_ms)),
            ExponentialOption::Multiplier(self.multiplier),
            ExponentialOption::RandomizationFactor(self.randomization_factor),
            ExponentialOption::MaxInterval(Duration::from_millis(self.max_interval_ms)),
            ExponentialOption::MaxElapsedTime(Duration::from_millis(self.max_elapsed_ms)),
        ]
    }
}

/// Fixed delay in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConstantSettings {
    pub interval_ms: u64,
}

impl Default for ConstantSettings {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

impl RetrySettings {
    /// Converts into options for [`RetryWrapper::new`](crate::RetryWrapper::new).
    pub fn into_options(self) -> Vec<RetryOption> {
        let backoff = match self.backoff {
            BackoffSettings::Exponential(exp) => {
                RetryOption::backoff(ExponentialBackoffGenerator::new(exp.options()))
            }
            BackoffSettings::Constant(constant) => RetryOption::backoff(
                ConstantBackoffGenerator::new(Duration::from_millis(constant.interval_ms)),
            ),
            BackoffSettings::None => RetryOption::backoff(NoBackoffGenerator),
        };
        vec![RetryOption::MaxRetries(self.max_retries), backoff]
    }

    /// Reads settings from `HTTP_RETRY_*` environment variables.
    ///
    /// Reads:
    /// - `HTTP_RETRY_MAX_RETRIES`
    /// - `HTTP_RETRY_BACKOFF` — `exponential` (default), `constant` or `none`
    /// - `HTTP_RETRY_INITIAL_INTERVAL_MS`, `HTTP_RETRY_MULTIPLIER`,
    ///   `HTTP_RETRY_RANDOMIZATION_FACTOR`, `HTTP_RETRY_MAX_INTERVAL_MS`,
    ///   `HTTP_RETRY_MAX_ELAPSED_MS` — exponential only
    /// - `HTTP_RETRY_INTERVAL_MS` — constant only
    ///
    /// Unset variables keep their defaults; set-but-empty or unparsable
    /// ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let mut settings = Self::default();

        if let Some(max) = env.parse("HTTP_RETRY_MAX_RETRIES")? {
            settings.max_retries = max;
        }

        let kind = env.get("HTTP_RETRY_BACKOFF")?;
        settings.backoff = match kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("exponential") => {
                let mut exp = ExponentialSettings::default();
                if let Some(v) = env.parse("HTTP_RETRY_INITIAL_INTERVAL_MS")? {
                    exp.initial_interval_ms = v;
                }
                if let Some(v) = env.parse("HTTP_RETRY_MULTIPLIER")? {
                    exp.multiplier = v;
                }
                if let Some(v) = env.parse("HTTP_RETRY_RANDOMIZATION_FACTOR")? {
                    exp.randomization_factor = v;
                }
                if let Some(v) = env.parse("HTTP_RETRY_MAX_INTERVAL_MS")? {
                    exp.max_interval_ms = v;
                }
                if let Some(v) = env.parse("HTTP_RETRY_MAX_ELAPSED_MS")? {
                    exp.max_elapsed_ms = v;
                }
                BackoffSettings::Exponential(exp)
            }
            Some("constant") => {
                let mut constant = ConstantSettings::default();
                if let Some(v) = env.parse("HTTP_RETRY_INTERVAL_MS")? {
                    constant.interval_ms = v;
                }
                BackoffSettings::Constant(constant)
            }
            Some("none") => BackoffSettings::None,
            Some(other) => {
                return Err(Error::Config(format!(
                    "HTTP_RETRY_BACKOFF must be exponential, constant or none, got '{other}'"
                )))
            }
        };

        Ok(settings)
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Result<Option<String>> {
        match (self.0)(key) {
            None => Ok(None),
            Some(value) if value.trim().is_empty() => {
                Err(Error::Config(format!("{key} is set but empty")))
            }
            Some(value) => Ok(Some(value.trim().to_owned())),
        }
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)?
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|err| Error::Config(format!("invalid {key} '{raw}': {err}")))
            })
            .transpose()
    }
}
