use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sqs::config::Credentials;

pub const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";

/// Where AWS calls go.
#[derive(Debug, Clone, Default)]
pub struct Endpoint {
    /// Talk to LocalStack with static `test` credentials
    pub local: bool,
    /// Overrides the endpoint URL, LocalStack's default when `local` is set
    pub url: Option<String>,
}

/// Loads the AWS configuration for one side of the transfer.
///
/// An explicit region wins, then the usual environment and profile lookup,
/// then `us-east-1`.
pub async fn load(region: Option<String>, endpoint: &Endpoint) -> SdkConfig {
    let region = RegionProviderChain::first_try(region.map(Region::new))
        .or_default_provider()
        .or_else(Region::from_static("us-east-1"));

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

    if endpoint.local {
        loader = loader
            .credentials_provider(Credentials::new("test", "test", None, None, "static"))
            .endpoint_url(endpoint.url.as_deref().unwrap_or(LOCALSTACK_ENDPOINT));
    } else if let Some(url) = &endpoint.url {
        loader = loader.endpoint_url(url);
    }

    loader.load().await
}
