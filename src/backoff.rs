//! Backoff sequences and the generators that create them.
//!
//! A [`Backoff`] is stateful and belongs to exactly one logical request. A
//! [`BackoffGenerator`] is the shared, immutable factory that hands every
//! request its own freshly reset sequence, so the stop condition reached by
//! one request never leaks into another.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// A sequence of waits between attempts.
pub trait Backoff: Send {
    /// Returns the wait before the next attempt, or `None` to stop retrying.
    fn next_backoff(&mut self) -> Option<Duration>;

    /// Restarts the sequence from attempt zero.
    fn reset(&mut self);
}

/// Factory producing an independent [`Backoff`] per call.
pub trait BackoffGenerator: Send + Sync {
    /// Returns a new sequence, already reset.
    fn generate(&self) -> Box<dyn Backoff>;
}

impl<F> BackoffGenerator for F
where
    F: Fn() -> Box<dyn Backoff> + Send + Sync,
{
    fn generate(&self) -> Box<dyn Backoff> {
        self()
    }
}

/// Settings for [`ExponentialBackoff`].
#[derive(Clone, Debug, PartialEq)]
pub struct ExponentialConfig {
    /// Wait between the first and second attempt. Default: 500 ms.
    pub initial_interval: Duration,
    /// Jitter applied as `interval ± factor * interval`. Default: 0.5.
    pub randomization_factor: f64,
    /// Growth factor between successive intervals. Default: 1.5.
    pub multiplier: f64,
    /// Upper bound for a single (pre-jitter) interval. Default: 60 s.
    pub max_interval: Duration,
    /// Total time after which the sequence stops; zero disables the
    /// limit. Default: 15 min.
    pub max_elapsed_time: Duration,
}

impl Default for ExponentialConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            randomization_factor: 0.5,
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Duration::from_secs(15 * 60),
        }
    }
}

/// A single adjustment to an [`ExponentialConfig`].
///
/// Options are applied in order; a later option overrides an earlier one
/// touching the same field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ExponentialOption {
    /// Sets [`ExponentialConfig::initial_interval`].
    InitialInterval(Duration),
    /// Sets [`ExponentialConfig::randomization_factor`].
    RandomizationFactor(f64),
    /// Sets [`ExponentialConfig::multiplier`].
    Multiplier(f64),
    /// Sets [`ExponentialConfig::max_interval`].
    MaxInterval(Duration),
    /// Sets [`ExponentialConfig::max_elapsed_time`].
    MaxElapsedTime(Duration),
}

impl ExponentialOption {
    /// Writes this option into `config`.
    pub fn apply(&self, config: &mut ExponentialConfig) {
        match *self {
            Self::InitialInterval(d) => config.initial_interval = d,
            Self::RandomizationFactor(f) => config.randomization_factor = f,
            Self::Multiplier(m) => config.multiplier = m,
            Self::MaxInterval(d) => config.max_interval = d,
            Self::MaxElapsedTime(d) => config.max_elapsed_time = d,
        }
    }
}

/// Exponentially growing, jittered waits bounded by a total elapsed time.
#[derive(Debug)]
pub struct ExponentialBackoff {
    config: ExponentialConfig,
    current_interval: Duration,
    started_at: Instant,
}

impl ExponentialBackoff {
    /// Creates a sequence starting at the configured initial interval.
    pub fn new(config: ExponentialConfig) -> Self {
        Self {
            current_interval: config.initial_interval,
            config,
            started_at: Instant::now(),
        }
    }

    /// Time since the sequence was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn increment_interval(&mut self) {
        let max = self.config.max_interval;
        let next = self.current_interval.as_secs_f64() * self.config.multiplier;
        self.current_interval = Duration::try_from_secs_f64(next)
            .map(|d| d.min(max))
            .unwrap_or(max);
    }
}

impl Backoff for ExponentialBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        let elapsed = self.elapsed();
        let next = randomize(
            self.config.randomization_factor,
            rand::thread_rng().gen::<f64>(),
            self.current_interval,
        );
        self.increment_interval();

        let limit = self.config.max_elapsed_time;
        if !limit.is_zero() && elapsed.saturating_add(next) > limit {
            return None;
        }
        Some(next)
    }

    fn reset(&mut self) {
        self.current_interval = self.config.initial_interval;
        self.started_at = Instant::now();
    }
}

/// Picks a value in `[interval - delta, interval + delta]` where
/// `delta = factor * interval`, using `random` in `[0, 1)`.
fn randomize(factor: f64, random: f64, interval: Duration) -> Duration {
    if factor <= 0.0 {
        return interval;
    }
    let secs = interval.as_secs_f64();
    let delta = factor * secs;
    let min = secs - delta;
    let max = secs + delta;
    let value = (min + random * (max - min)).max(0.0);
    Duration::try_from_secs_f64(value).unwrap_or(interval)
}

/// The same wait before every retry; never stops on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantBackoff {
    interval: Duration,
}

impl ConstantBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Backoff for ConstantBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        Some(self.interval)
    }

    fn reset(&mut self) {}
}

/// Retries immediately, forever.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ZeroBackoff;

impl Backoff for ZeroBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        Some(Duration::ZERO)
    }

    fn reset(&mut self) {}
}

/// Stops an inner sequence after `max` waits.
pub struct MaxRetriesBackoff {
    inner: Box<dyn Backoff>,
    max: u64,
    tries: u64,
}

impl MaxRetriesBackoff {
    pub fn new(inner: Box<dyn Backoff>, max: u64) -> Self {
        Self {
            inner,
            max,
            tries: 0,
        }
    }
}

impl Backoff for MaxRetriesBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.tries >= self.max {
            return None;
        }
        self.tries += 1;
        self.inner.next_backoff()
    }

    fn reset(&mut self) {
        self.tries = 0;
        self.inner.reset();
    }
}

impl fmt::Debug for MaxRetriesBackoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxRetriesBackoff")
            .field("max", &self.max)
            .field("tries", &self.tries)
            .finish()
    }
}

/// Generates [`ExponentialBackoff`] sequences.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExponentialBackoffGenerator {
    config: ExponentialConfig,
}

impl ExponentialBackoffGenerator {
    /// Applies `options` left to right over the library defaults.
    pub fn new<I>(options: I) -> Self
    where
        I: IntoIterator<Item = ExponentialOption>,
    {
        let mut config = ExponentialConfig::default();
        for option in options {
            option.apply(&mut config);
        }
        Self { config }
    }

    pub fn from_config(config: ExponentialConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExponentialConfig {
        &self.config
    }
}

impl BackoffGenerator for ExponentialBackoffGenerator {
    fn generate(&self) -> Box<dyn Backoff> {
        let mut backoff = ExponentialBackoff::new(self.config.clone());
        backoff.reset();
        Box::new(backoff)
    }
}

/// Generates [`ConstantBackoff`] sequences.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantBackoffGenerator {
    interval: Duration,
}

impl ConstantBackoffGenerator {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackoffGenerator for ConstantBackoffGenerator {
    fn generate(&self) -> Box<dyn Backoff> {
        Box::new(ConstantBackoff::new(self.interval))
    }
}

/// Generates [`ZeroBackoff`] sequences. Mostly useful in tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoBackoffGenerator;

impl BackoffGenerator for NoBackoffGenerator {
    fn generate(&self) -> Box<dyn Backoff> {
        Box::new(ZeroBackoff)
    }
}

/// Caps every sequence produced by an inner generator at `max` retries.
#[derive(Clone)]
pub struct MaxRetriesGenerator {
    inner: Arc<dyn BackoffGenerator>,
    max: u64,
}

impl MaxRetriesGenerator {
    pub fn new(inner: Arc<dyn BackoffGenerator>, max: u64) -> Self {
        Self { inner, max }
    }
}

impl BackoffGenerator for MaxRetriesGenerator {
    fn generate(&self) -> Box<dyn Backoff> {
        let mut backoff = MaxRetriesBackoff::new(self.inner.generate(), self.max);
        backoff.reset();
        Box::new(backoff)
    }
}

impl fmt::Debug for MaxRetriesGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxRetriesGenerator")
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}
