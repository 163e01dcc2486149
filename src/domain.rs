use crate::errors::{ModelError, RenderError, RepoError, StorageError};
use crate::models::{GeneratedMeme, MemeTemplate, NewTemplate, TemplateUpdate};
use async_trait::async_trait;
use uuid::Uuid;

/// Operations against the remote template collection.
#[async_trait]
pub trait TemplateRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Inserts a template and returns the stored row.
    async fn create(&self, template: NewTemplate) -> Result<MemeTemplate, RepoError>;

    /// Returns Ok(None) if the template is not found.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemeTemplate>, RepoError>;

    /// Lists every template, newest first.
    async fn list_all(&self) -> Result<Vec<MemeTemplate>, RepoError>;

    /// Returns Ok(None) when no template has this id.
    async fn update(&self, id: Uuid, update: TemplateUpdate) -> Result<Option<MemeTemplate>, RepoError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait GeneratedMemeRepository: Send + Sync + 'static {
    async fn create(&self, meme: &GeneratedMeme) -> Result<(), RepoError>;

    /// Lists generated memes, newest first.
    async fn list_recent(&self) -> Result<Vec<GeneratedMeme>, RepoError>;
}

/// Blob storage for uploaded and rendered images.
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError>;

    /// Returns the object bytes and its stored content type.
    async fn download(&self, key: &str) -> Result<(Vec<u8>, Option<String>), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Image bytes sent inline to the model.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

/// A hosted generative model that answers a prompt (optionally with an image) with text.
#[async_trait]
pub trait GenerativeModel: Send + Sync + 'static {
    async fn generate(&self, request: ModelRequest) -> Result<String, ModelError>;
}

/// Fetches template images that live outside our own bucket.
#[async_trait]
pub trait ImageLoader: Send + Sync + 'static {
    async fn load(&self, url: &str) -> Result<Vec<u8>, RenderError>;
}
