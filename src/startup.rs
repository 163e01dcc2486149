use crate::config::Config;
use crate::errors::AppError;
use crate::repositories::{GENERATED_MEME_KEY, TEMPLATE_KEY};
use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    types::{AttributeDefinition, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType},
    Client as DynamoDbClient,
};
use aws_sdk_s3::{
    error::SdkError as S3SdkError,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client as S3Client,
};

/// Creates a table keyed by a single string hash key, unless it already exists.
async fn create_table_if_not_exists(client: &DynamoDbClient, table: &str, hash_key: &str) -> Result<(), AppError> {
    let result = client
        .create_table()
        .table_name(table)
        .attribute_definitions(
            AttributeDefinition::builder()
                .attribute_name(hash_key)
                .attribute_type(ScalarAttributeType::S)
                .build()?,
        )
        .key_schema(
            KeySchemaElement::builder()
                .attribute_name(hash_key)
                .key_type(KeyType::Hash)
                .build()?,
        )
        .billing_mode(BillingMode::PayPerRequest)
        .send()
        .await;

    match result {
        Ok(_) => {
            tracing::info!(%table, "Startup: table created");
            Ok(())
        }
        Err(DynamoSdkError::ServiceError(service_err)) if service_err.err().is_resource_in_use_exception() => {
            tracing::info!(%table, "Startup: table already exists");
            Ok(())
        }
        Err(e) => {
            tracing::error!(%table, error = ?e, "Startup: failed to create table");
            Err(AppError::InitError(format!("Failed to create table '{}': {}", table, e)))
        }
    }
}

/// Creates the image bucket, with a location constraint outside us-east-1.
async fn ensure_bucket_exists(client: &S3Client, bucket: &str, region: &str) -> Result<(), AppError> {
    let mut request = client.create_bucket().bucket(bucket);
    if region != "us-east-1" {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build(),
        );
    }

    match request.send().await {
        Ok(_) => {
            tracing::info!(%bucket, "Startup: bucket created");
            Ok(())
        }
        Err(S3SdkError::ServiceError(service_err))
            if matches!(
                service_err.err().meta().code(),
                Some("BucketAlreadyOwnedByYou") | Some("BucketAlreadyExists")
            ) =>
        {
            tracing::info!(%bucket, "Startup: bucket already exists");
            Ok(())
        }
        Err(e) => {
            tracing::error!(%bucket, error = ?e, "Startup: failed to create bucket");
            Err(AppError::InitError(format!("Failed to create bucket '{}': {}", bucket, e)))
        }
    }
}

/// Provisions the template table, the generated-meme table and the image bucket.
pub async fn init_resources(db_client: &DynamoDbClient, s3_client: &S3Client, config: &Config) -> Result<(), AppError> {
    tracing::info!("Startup: initializing AWS resources");
    create_table_if_not_exists(db_client, &config.templates_table, TEMPLATE_KEY).await?;
    create_table_if_not_exists(db_client, &config.generated_memes_table, GENERATED_MEME_KEY).await?;
    ensure_bucket_exists(s3_client, &config.meme_bucket_name, &config.aws_region).await?;
    tracing::info!("Startup: AWS resources ready");
    Ok(())
}
