//! In-memory stand-ins for the remote services, used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use image::{Rgba, RgbaImage};
use uuid::Uuid;

use crate::domain::{FileStorage, GeneratedMemeRepository, GenerativeModel, ImageLoader, ModelRequest, TemplateRepository};
use crate::errors::{ModelError, RenderError, RepoError, StorageError};
use crate::models::{GeneratedMeme, MemeTemplate, NewTemplate, TemplateUpdate};
use crate::renderer::encode_png;

pub fn template(name: &str, tags: &[&str], description: Option<&str>) -> MemeTemplate {
    let now = Utc::now();
    MemeTemplate {
        id: Uuid::new_v4(),
        name: name.to_string(),
        image_url: format!("https://img.example.com/{}.png", name),
        description: description.map(str::to_string),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        created_at: now,
        updated_at: now,
    }
}

/// A small solid PNG.
pub fn png_bytes() -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(8, 8, Rgba([30, 60, 90, 255]))).unwrap()
}

#[derive(Default)]
pub struct InMemoryTemplates {
    rows: Mutex<Vec<MemeTemplate>>,
    fail: bool,
    fail_deletes: bool,
}

impl InMemoryTemplates {
    /// Rows are kept in the given order, which is also the listing order.
    pub fn with(rows: Vec<MemeTemplate>) -> Self {
        Self { rows: Mutex::new(rows), ..Self::default() }
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// Reads work, deletes fail.
    pub fn failing_deletes(rows: Vec<MemeTemplate>) -> Self {
        Self { fail_deletes: true, ..Self::with(rows) }
    }

    pub fn snapshot(&self) -> Vec<MemeTemplate> {
        self.rows.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), RepoError> {
        if self.fail {
            Err(RepoError::BackendError(anyhow!("table unavailable")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplates {
    async fn create(&self, new: NewTemplate) -> Result<MemeTemplate, RepoError> {
        self.check()?;
        // Newer than anything already stored.
        let now = Utc::now() + Duration::seconds(1);
        let template = MemeTemplate {
            id: Uuid::new_v4(),
            name: new.name,
            image_url: new.image_url,
            description: new.description,
            tags: new.tags,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().insert(0, template.clone());
        Ok(template)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemeTemplate>, RepoError> {
        self.check()?;
        Ok(self.rows.lock().unwrap().iter().find(|t| t.id == id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<MemeTemplate>, RepoError> {
        self.check()?;
        Ok(self.snapshot())
    }

    async fn update(&self, id: Uuid, update: TemplateUpdate) -> Result<Option<MemeTemplate>, RepoError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.iter_mut().find(|t| t.id == id).map(|t| {
            t.name = update.name;
            t.description = update.description;
            t.tags = update.tags;
            t.updated_at = Utc::now();
            t.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        self.check()?;
        if self.fail_deletes {
            return Err(RepoError::BackendError(anyhow!("delete rejected")));
        }
        self.rows.lock().unwrap().retain(|t| t.id != id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryGeneratedMemes {
    rows: Mutex<Vec<GeneratedMeme>>,
}

impl InMemoryGeneratedMemes {
    pub fn snapshot(&self) -> Vec<GeneratedMeme> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl GeneratedMemeRepository for InMemoryGeneratedMemes {
    async fn create(&self, meme: &GeneratedMeme) -> Result<(), RepoError> {
        self.rows.lock().unwrap().insert(0, meme.clone());
        Ok(())
    }

    async fn list_recent(&self) -> Result<Vec<GeneratedMeme>, RepoError> {
        Ok(self.snapshot())
    }
}

#[derive(Default)]
pub struct InMemoryStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
}

impl InMemoryStorage {
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn put(&self, key: &str, data: Vec<u8>, content_type: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, Some(content_type.to_string())));
    }
}

#[async_trait]
impl FileStorage for InMemoryStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: Option<String>) -> Result<(), StorageError> {
        self.objects.lock().unwrap().insert(key.to_string(), (data, content_type));
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<(Vec<u8>, Option<String>), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Answers every request with the same text (or the same failure) and records what it was asked.
pub struct CannedModel {
    reply: Option<String>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl CannedModel {
    pub fn replying(text: &str) -> Self {
        Self { reply: Some(text.to_string()), requests: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { reply: None, requests: Mutex::new(Vec::new()) }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for CannedModel {
    async fn generate(&self, request: ModelRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request);
        self.reply.clone().ok_or(ModelError::Api { status: 503, body: "model unavailable".to_string() })
    }
}

/// Serves [`png_bytes`] for every URL and records the URLs asked for.
#[derive(Default)]
pub struct StaticImageLoader {
    urls: Mutex<Vec<String>>,
}

impl StaticImageLoader {
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageLoader for StaticImageLoader {
    async fn load(&self, url: &str) -> Result<Vec<u8>, RenderError> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(png_bytes())
    }
}
