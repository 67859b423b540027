use roundtrip_retry::{Client, Logger, OAuthOption, OAuthWrapper, RetryOption, RetrySettings, RetryWrapper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let url = std::env::var("RETRY_DEMO_URL")?;
    let token = std::env::var("RETRY_DEMO_TOKEN").ok();

    let mut options = RetrySettings::from_env()?.into_options();
    options.push(RetryOption::Logger(Logger::current()));

    let mut builder = Client::builder().wrapper(RetryWrapper::new(options));
    if let Some(token) = token {
        builder = builder.wrapper(OAuthWrapper::new([OAuthOption::AccessToken(token)]));
    }
    let client = builder.build();

    let response = client.get(&url).await?;
    println!("{} {}", response.status(), response.text().await?);

    Ok(())
}
