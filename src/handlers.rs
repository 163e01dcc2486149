use crate::{
    classification::{dedupe_tags, OverlaySuggestion},
    domain::InlineImage,
    errors::{AppError, StorageError},
    matching::MatchOutcome,
    models::{GeneratedMeme, MemeTemplate, NewTemplate, TemplateUpdate},
    renderer::{decode_image, encode_png, render_meme, OverlayInstructions},
    storage::{generated_key, key_from_public_url, public_url, upload_key},
    AppState,
};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const PNG_MIME: &str = "image/png";

/// Unwraps a JSON body, turning axum's rejection into our error shape.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidInput(rejection.body_text()))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidInput(format!("'{}' is required and cannot be empty", field)))
}

fn required_tags(tags: Option<Vec<String>>) -> Result<Vec<String>, AppError> {
    tags.map(dedupe_tags)
        .ok_or_else(|| AppError::InvalidInput("'tags' must be an array".to_string()))
}

struct UploadedImage {
    data: Vec<u8>,
    file_name: Option<String>,
    content_type: String,
}

/// Reads the `image` field of a multipart form.
async fn read_image_field(multipart: &mut Multipart) -> Result<UploadedImage, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            tracing::debug!(field = ?field.name(), "Ignoring multipart field");
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let declared_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?.to_vec();
        if data.is_empty() {
            return Err(AppError::InvalidInput("image data cannot be empty".to_string()));
        }
        let content_type = declared_type
            .or_else(|| {
                file_name
                    .as_deref()
                    .and_then(|name| mime_guess::from_path(name).first_raw())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());
        return Ok(UploadedImage { data, file_name, content_type });
    }
    Err(AppError::MissingFormField("image".to_string()))
}

async fn find_template(state: &AppState, id_str: &str) -> Result<MemeTemplate, AppError> {
    let template_id = Uuid::parse_str(id_str)?;
    state
        .template_repo
        .get_by_id(template_id)
        .await?
        .ok_or(AppError::TemplateNotFound(template_id))
}

// --- Templates ---

pub async fn list_templates(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let templates = state.template_repo.list_all().await?;
    tracing::debug!(count = templates.len(), "Listed templates");
    Ok(Json(json!({ "templates": templates })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    name: Option<String>,
    image_url: Option<String>,
    description: Option<String>,
    tags: Option<Vec<String>>,
}

pub async fn create_template(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateTemplateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(payload)?;
    let new = NewTemplate {
        name: required_text(body.name, "name")?,
        image_url: required_text(body.image_url, "imageUrl")?,
        description: Some(required_text(body.description, "description")?),
        tags: required_tags(body.tags)?,
    };

    let template = state.template_repo.create(new).await?;
    tracing::info!(template_id = %template.id, name = %template.name, "Template created");
    Ok((StatusCode::CREATED, Json(json!({ "template": template }))))
}

pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let template = find_template(&state, &id_str).await?;
    Ok(Json(json!({ "template": template })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTemplateRequest {
    name: Option<String>,
    description: Option<String>,
    tags: Option<Vec<String>>,
}

pub async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    payload: Result<Json<UpdateTemplateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let template_id = Uuid::parse_str(&id_str)?;
    let body = json_body(payload)?;
    let update = TemplateUpdate {
        name: required_text(body.name, "name")?,
        description: Some(required_text(body.description, "description")?),
        tags: required_tags(body.tags)?,
    };

    let template = state
        .template_repo
        .update(template_id, update)
        .await?
        .ok_or(AppError::TemplateNotFound(template_id))?;
    tracing::info!(%template_id, "Template updated");
    Ok(Json(json!({ "template": template })))
}

/// Deletes the template row and then, when the image lives in our bucket, its blob.
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let template = find_template(&state, &id_str).await?;
    state.template_repo.delete(template.id).await?;

    if let Some(key) = key_from_public_url(&state.public_base_url, &template.image_url) {
        match state.file_storage.delete(key).await {
            Ok(()) => tracing::debug!(s3_key = %key, "Deleted template image"),
            Err(StorageError::NotFound(_)) => tracing::warn!(s3_key = %key, "Template image already gone"),
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(template_id = %template.id, "Template deleted");
    Ok(Json(json!({ "success": true })))
}

// --- Uploads and classification ---

pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let image = read_image_field(&mut multipart).await?;
    let key = upload_key(image.file_name.as_deref());
    let size = image.data.len();

    state
        .file_storage
        .upload(&key, image.data, Some(image.content_type))
        .await?;

    let image_url = public_url(&state.public_base_url, &key);
    tracing::info!(s3_key = %key, size, "Image uploaded");
    Ok(Json(json!({ "imageUrl": image_url })))
}

pub async fn classify_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let image = read_image_field(&mut multipart).await?;
    let extraction = state.classifier.classify_image(image.data, &image.content_type).await?;
    let parsed = extraction.is_extracted();
    let result = extraction.into_result();

    tracing::info!(parsed, tags = ?result.tags, "Classified uploaded image");
    Ok(Json(json!({
        "tags": result.tags,
        "description": result.description,
        "name": result.name,
        "parsed": parsed,
    })))
}

// --- Matching ---

#[derive(Debug, Deserialize)]
pub struct MatchTemplateRequest {
    prompt: Option<String>,
}

pub async fn match_template(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MatchTemplateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let prompt = required_text(json_body(payload)?.prompt, "prompt")?;

    match state.matcher.match_prompt(&prompt).await? {
        MatchOutcome::Matched(templates) => Ok(Json(json!({ "templates": templates }))),
        MatchOutcome::NoMatch => Err(AppError::NoMatchingTemplates),
    }
}

// --- Generation ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMemeRequest {
    template_id: Option<String>,
    image_url: Option<String>,
    text: Option<String>,
    #[serde(default)]
    ai_placement: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateMemeResponse {
    generated_meme: GeneratedMeme,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<OverlayInstructions>,
}

/// Fetches image bytes, reading our own `/images/` URLs straight from storage.
async fn load_image(state: &AppState, url: &str) -> Result<(Vec<u8>, String), AppError> {
    if let Some(key) = key_from_public_url(&state.public_base_url, url) {
        let (data, content_type) = state.file_storage.download(key).await?;
        let mime = content_type.unwrap_or_else(|| guess_mime(url));
        return Ok((data, mime));
    }
    let data = state.image_loader.load(url).await?;
    Ok((data, guess_mime(url)))
}

fn guess_mime(url: &str) -> String {
    mime_guess::from_path(url)
        .first_raw()
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or(PNG_MIME)
        .to_string()
}

/// Renders the caption onto a template (or raw image URL), stores the PNG and
/// records the generated meme.
pub async fn generate_meme_image(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateMemeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let body = json_body(payload)?;
    let text = required_text(body.text, "text")?;

    let (template_id, source_url) = match (body.template_id, body.image_url) {
        (Some(id_str), _) => {
            let template = find_template(&state, &id_str).await?;
            (Some(template.id), template.image_url)
        }
        (None, Some(url)) if !url.trim().is_empty() => (None, url.trim().to_string()),
        _ => return Err(AppError::InvalidInput("either 'templateId' or 'imageUrl' is required".to_string())),
    };

    let (source_bytes, source_mime) = load_image(&state, &source_url).await?;

    let suggestion = if body.ai_placement {
        let image = InlineImage { mime_type: source_mime, data: source_bytes.clone() };
        state.classifier.suggest_overlay(image, &text).await?
    } else {
        OverlaySuggestion::Fallback(OverlayInstructions::for_text(text.as_str()))
    };

    let (png, instructions) = match suggestion {
        OverlaySuggestion::Image { data, .. } => {
            tracing::info!("Model returned a finished image, storing it as-is");
            (encode_png(&decode_image(&data)?.to_rgba8())?, None)
        }
        OverlaySuggestion::Instructions(instructions) | OverlaySuggestion::Fallback(instructions) => {
            let base = decode_image(&source_bytes)?;
            let rendered = render_meme(&base, &instructions);
            (encode_png(&rendered)?, body.ai_placement.then_some(instructions))
        }
    };

    let meme_id = Uuid::new_v4();
    let key = generated_key(meme_id);
    state
        .file_storage
        .upload(&key, png, Some(PNG_MIME.to_string()))
        .await?;

    let generated = GeneratedMeme {
        id: meme_id,
        prompt: text,
        template_id,
        image_url: public_url(&state.public_base_url, &key),
        created_at: Utc::now(),
    };
    state.generated_repo.create(&generated).await?;

    tracing::info!(generated_meme_id = %meme_id, template_id = ?template_id, s3_key = %key, "Meme generated");
    Ok((
        StatusCode::CREATED,
        Json(GenerateMemeResponse { generated_meme: generated, instructions }),
    ))
}

pub async fn list_generated_memes(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let memes = state.generated_repo.list_recent().await?;
    tracing::debug!(count = memes.len(), "Listed generated memes");
    Ok(Json(json!({ "generatedMemes": memes })))
}

// --- Images ---

/// Serves an object from the image bucket.
pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    tracing::debug!(s3_key = %key, "Serving image");
    let (data, content_type) = state.file_storage.download(&key).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_deref().unwrap_or("application/octet-stream"))
        .body(Body::from(data))
        .map_err(|e| AppError::InternalServerError(format!("Failed to build image response: {}", e)))
}
