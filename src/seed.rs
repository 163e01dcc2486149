//! Bulk import of popular templates from the public Imgflip catalogue.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::classification::dedupe_tags;
use crate::domain::TemplateRepository;
use crate::models::{MemeTemplate, NewTemplate};

const FALLBACK_TAGS: [&str; 3] = ["meme", "template", "popular"];

/// Hand-picked tags for the best-known templates.
const CURATED_TAGS: &[(&str, &[&str])] = &[
    ("Drake Hotline Bling", &["reaction", "choice", "drake", "approval"]),
    ("Drake Pointing", &["reaction", "choice", "drake", "approval"]),
    ("Distracted Boyfriend", &["choice", "temptation", "relationship", "decision"]),
    ("This Is Fine", &["chaos", "calm", "disaster", "dog"]),
    ("Woman Yelling At Cat", &["argument", "confusion", "reaction", "cat"]),
    ("Expanding Brain", &["intelligence", "progression", "comparison", "brain"]),
    ("Change My Mind", &["debate", "opinion", "controversy", "steven crowder"]),
    ("Mocking Spongebob", &["mocking", "sarcasm", "spongebob", "alternating"]),
    ("Two Buttons", &["decision", "dilemma", "choice", "sweating"]),
    ("Surprised Pikachu", &["surprise", "shock", "pokemon", "pikachu"]),
    ("Philosoraptor", &["philosophy", "thinking", "questions", "dinosaur"]),
    ("One Does Not Simply", &["lord of the rings", "boromir", "difficulty"]),
    ("Batman Slapping Robin", &["batman", "robin", "slap", "correction"]),
    ("Hide the Pain Harold", &["harold", "pain", "smile", "hiding"]),
    ("Disaster Girl", &["disaster", "girl", "fire", "evil smile"]),
    ("Success Kid", &["success", "kid", "victory", "fist pump"]),
    ("Bad Luck Brian", &["bad luck", "brian", "unfortunate", "glasses"]),
    ("Overly Attached Girlfriend", &["girlfriend", "obsessive", "crazy", "stare"]),
    ("Ancient Aliens", &["aliens", "history channel", "conspiracy", "giorgio"]),
    ("First World Problems", &["problems", "privileged", "complaints"]),
    ("Grumpy Cat", &["grumpy", "cat", "frown", "no"]),
];

#[derive(Debug, Deserialize)]
struct ImgflipResponse {
    success: bool,
    data: Option<ImgflipData>,
}

#[derive(Debug, Deserialize)]
struct ImgflipData {
    memes: Vec<ImgflipMeme>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImgflipMeme {
    pub name: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Curated tags for a template name (case-insensitive), or the generic fallback.
pub fn tags_for(name: &str) -> Vec<String> {
    let tags = CURATED_TAGS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name.trim()))
        .map(|(_, tags)| *tags)
        .unwrap_or(&FALLBACK_TAGS);
    dedupe_tags(tags.iter().copied())
}

pub fn to_new_template(meme: &ImgflipMeme) -> NewTemplate {
    NewTemplate {
        name: meme.name.clone(),
        image_url: meme.url.clone(),
        description: Some(format!("{} meme template - {}x{}", meme.name, meme.width, meme.height)),
        tags: tags_for(&meme.name),
    }
}

fn parse_catalogue(body: &str) -> Result<Vec<ImgflipMeme>> {
    let response: ImgflipResponse = serde_json::from_str(body).context("Imgflip returned malformed JSON")?;
    match response.data {
        Some(data) if response.success => Ok(data.memes),
        _ => bail!("Imgflip reported failure"),
    }
}

pub async fn fetch_catalogue(http_client: &reqwest::Client, url: &str) -> Result<Vec<ImgflipMeme>> {
    tracing::info!(%url, "Fetching meme catalogue");
    let body = http_client
        .get(url)
        .send()
        .await
        .context("Failed to reach Imgflip")?
        .error_for_status()
        .context("Imgflip returned an error status")?
        .text()
        .await
        .context("Failed to read Imgflip response")?;
    parse_catalogue(&body)
}

/// Inserts the first `limit` catalogue entries. With `replace`, existing
/// templates are deleted first.
pub async fn seed_templates(
    repo: &dyn TemplateRepository,
    catalogue: &[ImgflipMeme],
    limit: usize,
    replace: bool,
) -> Result<Vec<MemeTemplate>> {
    if replace {
        let existing = repo.list_all().await.context("Failed to list existing templates")?;
        tracing::info!(count = existing.len(), "Clearing existing templates");
        for template in existing {
            repo.delete(template.id)
                .await
                .with_context(|| format!("Failed to delete template {}", template.id))?;
        }
    }

    let mut inserted = Vec::new();
    for meme in catalogue.iter().take(limit) {
        let template = repo
            .create(to_new_template(meme))
            .await
            .with_context(|| format!("Failed to insert template '{}'", meme.name))?;
        tracing::info!(template_id = %template.id, name = %template.name, tags = ?template.tags, "Seeded template");
        inserted.push(template);
    }
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{template, InMemoryTemplates};

    const CATALOGUE: &str = r#"{"success":true,"data":{"memes":[
        {"id":"181913649","name":"Drake Hotline Bling","url":"https://i.imgflip.com/30b1gx.jpg","width":1200,"height":1200,"box_count":2},
        {"id":"87743020","name":"Two Buttons","url":"https://i.imgflip.com/1g8my4.jpg","width":600,"height":908,"box_count":3},
        {"id":"1","name":"Obscure Thing","url":"https://i.imgflip.com/x.jpg","width":10,"height":20,"box_count":2}
    ]}}"#;

    #[test]
    fn curated_names_get_curated_tags() {
        assert_eq!(tags_for("two buttons"), vec!["decision", "dilemma", "choice", "sweating"]);
        assert_eq!(tags_for("Something New"), vec!["meme", "template", "popular"]);
    }

    #[test]
    fn catalogue_entries_become_templates() {
        let memes = parse_catalogue(CATALOGUE).unwrap();
        let new = to_new_template(&memes[2]);
        assert_eq!(new.description.as_deref(), Some("Obscure Thing meme template - 10x20"));
        assert_eq!(new.image_url, "https://i.imgflip.com/x.jpg");
    }

    #[test]
    fn unsuccessful_catalogue_is_an_error() {
        assert!(parse_catalogue(r#"{"success":false,"error_message":"nope"}"#).is_err());
    }

    #[tokio::test]
    async fn seeding_respects_limit_and_replace() {
        let repo = InMemoryTemplates::with(vec![template("old", &["x"], None)]);
        let memes = parse_catalogue(CATALOGUE).unwrap();

        let inserted = seed_templates(&repo, &memes, 2, true).await.unwrap();
        assert_eq!(inserted.len(), 2);

        let names: Vec<String> = repo.snapshot().into_iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 2);
        assert!(!names.contains(&"old".to_string()));
    }
}
