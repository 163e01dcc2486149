use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use aws_smithy_types::error::operation::BuildError as SmithyBuildError;
use thiserror::Error;
use uuid::Uuid;

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("Database backend error: {0}")]
    BackendError(#[from] anyhow::Error),

    #[error("Stored data could not be read back: {0}")]
    DataCorruption(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File upload failed: {0}")]
    UploadFailed(String),

    #[error("File not found with key: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    BackendError(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Model returned no text")]
    EmptyResponse,

    #[error("Could not decode model payload: {0}")]
    Decode(String),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Could not encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Could not fetch image {url}: {reason}")]
    Fetch { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Failed to extract keywords from the model")]
    Extraction(#[source] ModelError),

    #[error("Failed to fetch templates")]
    Fetch(#[source] RepoError),
}

// --- Web Layer Error ---

#[derive(Error, Debug)]
pub enum AppError {
    // Input validation / request parsing errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Missing form field: {0}")]
    MissingFormField(String),
    #[error("Error processing multipart form data: {0}")]
    MultipartError(#[from] axum::extract::multipart::MultipartError),
    #[error("Invalid template ID format: {0}")]
    InvalidUuid(#[from] uuid::Error),

    // Not-found conditions
    #[error("Template not found with ID: {0}")]
    TemplateNotFound(Uuid),
    #[error("No matching templates found")]
    NoMatchingTemplates,
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    // Upstream dependencies
    #[error("Template store error")]
    RepositoryError(#[source] RepoError),
    #[error("File storage error")]
    StorageError(#[source] StorageError),
    #[error("Model error")]
    ModelError(#[source] ModelError),
    #[error("Render error")]
    RenderError(#[source] RenderError),
    #[error(transparent)]
    MatchError(#[from] MatchError),

    // Configuration / Startup errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

// --- Conversions from Domain Errors to AppError ---

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        AppError::RepositoryError(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::ImageNotFound(key),
            other => AppError::StorageError(other),
        }
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::ModelError(err)
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::RenderError(err)
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<SmithyBuildError> for AppError {
    fn from(err: SmithyBuildError) -> Self {
        AppError::InitError(format!("Failed to build AWS request: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalServerError(format!("IO error: {}", err))
    }
}

// --- Axum Response Implementation ---

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            // 4xx Client Errors
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::MissingFormField(field) => (StatusCode::BAD_REQUEST, format!("Missing form field: {}", field)),
            AppError::MultipartError(e) => (StatusCode::BAD_REQUEST, format!("Invalid multipart form data: {}", e)),
            AppError::InvalidUuid(e) => (StatusCode::BAD_REQUEST, format!("Invalid ID format: {}", e)),
            AppError::TemplateNotFound(id) => (StatusCode::NOT_FOUND, format!("Template not found with ID: {}", id)),
            AppError::NoMatchingTemplates => (StatusCode::NOT_FOUND, "No matching templates found".to_string()),
            AppError::ImageNotFound(key) => (StatusCode::NOT_FOUND, format!("Image not found: {}", key)),

            // 5xx Server Errors carry the upstream message
            AppError::RepositoryError(e) => {
                tracing::error!(error.source = ?e, "Repository error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Database operation failed: {}", e))
            }
            AppError::StorageError(e) => {
                tracing::error!(error.source = ?e, "Storage error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("File storage operation failed: {}", e))
            }
            AppError::ModelError(e) => {
                tracing::error!(error.source = ?e, "Model error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Model request failed: {}", e))
            }
            AppError::RenderError(e) => {
                tracing::error!(error.source = ?e, "Render error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to render meme: {}", e))
            }
            AppError::MatchError(e) => {
                let detail = match e {
                    MatchError::Extraction(inner) => inner.to_string(),
                    MatchError::Fetch(inner) => inner.to_string(),
                };
                tracing::error!(error.detail = %detail, "Template matching failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{}: {}", e, detail))
            }
            AppError::ConfigError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server configuration error".to_string())
            }
            AppError::InitError(msg) => {
                tracing::error!("Initialization error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server initialization error".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "An internal server error occurred".to_string())
            }
        };

        tracing::error!(error.message = %error_message, error.status = %status, "Responding with error");

        let body = Json(serde_json::json!({ "error": error_message }));
        (status, body).into_response()
    }
}
