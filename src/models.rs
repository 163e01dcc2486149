use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A base meme image plus the metadata used for matching.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemeTemplate {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when inserting a template. Id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub image_url: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// Editable subset of a template.
#[derive(Debug, Clone)]
pub struct TemplateUpdate {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

/// A rendered meme: overlay text on top of a template image.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedMeme {
    pub id: Uuid,
    pub prompt: String,
    pub template_id: Option<Uuid>,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

/// A template annotated with its match score for one request.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScoredTemplate {
    #[serde(flatten)]
    pub template: MemeTemplate,
    pub score: f64,
}
