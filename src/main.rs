use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod ai_client;
mod aws_clients;
mod classification;
mod config;
mod domain;
mod errors;
mod handlers;
mod matching;
mod models;
mod renderer;
mod repositories;
mod routes;
mod seed;
mod startup;
mod storage;
#[cfg(test)]
mod test_support;

use crate::ai_client::GeminiClient;
use crate::aws_clients::{create_dynamodb_client, create_s3_client, create_sdk_config};
use crate::classification::Classifier;
use crate::config::Config;
use crate::domain::{FileStorage, GeneratedMemeRepository, ImageLoader, TemplateRepository};
use crate::errors::AppError;
use crate::matching::TemplateMatcher;
use crate::renderer::HttpImageLoader;
use crate::repositories::{DynamoDbGeneratedMemeRepository, DynamoDbTemplateRepository};
use crate::storage::S3FileStorage;

/// Shared, dependency-injected services for the handlers.
pub struct AppState {
    pub template_repo: Arc<dyn TemplateRepository>,
    pub generated_repo: Arc<dyn GeneratedMemeRepository>,
    pub file_storage: Arc<dyn FileStorage>,
    pub classifier: Classifier,
    pub matcher: TemplateMatcher,
    pub image_loader: Arc<dyn ImageLoader>,
    /// Prefix of the URLs handed out for images in our bucket.
    pub public_base_url: String,
}

#[derive(Parser, Debug)]
#[command(name = "axum_meme_generator", about = "Meme template matching and generation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Import popular templates from Imgflip into the template table.
    SeedTemplates {
        /// Number of catalogue entries to import.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Delete every existing template first.
        #[arg(long)]
        replace: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "axum_meme_generator=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    tracing::debug!(?config, "Configuration loaded");

    let sdk_config = create_sdk_config(&config).await;
    let db_client = create_dynamodb_client(&sdk_config);
    let s3_client = create_s3_client(&sdk_config);
    startup::init_resources(&db_client, &s3_client, &config).await?;

    let http_client = reqwest::Client::new();
    let template_repo: Arc<dyn TemplateRepository> =
        Arc::new(DynamoDbTemplateRepository::new(db_client.clone(), config.templates_table.clone()));

    match cli.command.unwrap_or(Command::Serve) {
        Command::SeedTemplates { limit, replace } => {
            let catalogue = seed::fetch_catalogue(&http_client, &config.imgflip_url)
                .await
                .map_err(|e| AppError::InitError(format!("{:#}", e)))?;
            let inserted = seed::seed_templates(template_repo.as_ref(), &catalogue, limit, replace)
                .await
                .map_err(|e| AppError::InitError(format!("{:#}", e)))?;
            tracing::info!(count = inserted.len(), "Seeding complete");
            Ok(())
        }
        Command::Serve => {
            let classifier = Classifier::new(Arc::new(GeminiClient::new(http_client.clone(), config.gemini.clone())));
            let state = Arc::new(AppState {
                template_repo: template_repo.clone(),
                generated_repo: Arc::new(DynamoDbGeneratedMemeRepository::new(
                    db_client,
                    config.generated_memes_table.clone(),
                )),
                file_storage: Arc::new(S3FileStorage::new(s3_client, config.meme_bucket_name.clone())),
                matcher: TemplateMatcher::new(classifier.clone(), template_repo, config.matching.clone()),
                classifier,
                image_loader: Arc::new(HttpImageLoader::new(http_client)),
                public_base_url: config.public_base_url.clone(),
            });

            let app = routes::create_router(state);
            let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
            tracing::info!("Server listening on http://{}", config.bind_address);
            axum::serve(listener, app).await?;
            Ok(())
        }
    }
}
