use crate::config::Config;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;

/// Shared SDK configuration for the template store and the image bucket.
/// Credentials come from the default provider chain.
pub async fn create_sdk_config(config: &Config) -> SdkConfig {
    tracing::info!(sdk_region = %config.aws_region, "Configuring AWS SDK");

    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.aws_region.clone()));

    match &config.localstack_endpoint {
        Some(endpoint_url) => {
            tracing::info!(%endpoint_url, "Using endpoint override for DynamoDB and S3");
            loader = loader.endpoint_url(endpoint_url);
        }
        None => tracing::info!("Using default AWS endpoints"),
    }

    loader.load().await
}

pub fn create_dynamodb_client(sdk_config: &SdkConfig) -> DynamoDbClient {
    DynamoDbClient::new(sdk_config)
}

// Path-style addressing keeps bucket URLs working against LocalStack.
pub fn create_s3_client(sdk_config: &SdkConfig) -> S3Client {
    let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
        .force_path_style(true)
        .build();
    S3Client::from_conf(s3_config)
}
