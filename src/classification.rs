//! Prompts sent to the model and tolerant parsing of what comes back.
//!
//! Model output is advisory. A response that cannot be read is reported as
//! [`Extraction::Unparseable`] instead of an error so callers can carry on
//! with empty suggestions.

use std::collections::HashSet;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::Value;

use crate::domain::{GenerativeModel, InlineImage, ModelRequest};
use crate::errors::ModelError;
use crate::renderer::OverlayInstructions;

pub const DEFAULT_OVERLAY_TEXT_COUNT: u32 = 2;

const CLASSIFY_IMAGE_PROMPT: &str = r#"You are an expert at reading meme images.
Look at the attached meme image and:
- describe what happens in it, and the joke it carries, in one vivid sentence;
- list exactly 10 lowercase tags of at most 3 words each that someone searching for this meme would use (skip the word "meme" unless it matters);
- give the template a short name of 2 or 3 words.

Reply with this JSON object and nothing else:
{"description": ["<one sentence>"], "relevant_tags": ["tag1", "tag2"], "name": "word1 word2"}"#;

const ANALYZE_PROMPT_TEMPLATE: &str = r#"You are an expert at understanding meme requests.
For the request below:
- describe the scene it calls for in one vivid sentence;
- list 15 lowercase tags of at most 3 words each;
- count how many separate text captions (speakers, labels, panels) the meme needs; use 2 when unsure.

Request: {prompt}

Reply with this JSON object and nothing else:
{"description": "<one sentence>", "relevant_tags": ["tag1", "tag2"], "number_of_text": 2}"#;

const OVERLAY_PROMPT_TEMPLATE: &str = r##"You are laying out a caption on the attached meme template.
Caption: "{text}"

Decide where the caption reads best and how it should look. Reply with this JSON object and nothing else:
{"instructions": {"text": "<caption>", "position": "top|center|bottom", "fontSize": 24, "color": "#000000", "strokeColor": "#ffffff", "strokeWidth": 2, "alignment": "center"}}"##;

/// Structured suggestion extracted from a model response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub description: String,
    pub tags: Vec<String>,
    pub name: String,
    pub overlay_text_count: u32,
}

impl Default for ClassificationResult {
    fn default() -> Self {
        Self {
            description: String::new(),
            tags: Vec::new(),
            name: String::new(),
            overlay_text_count: DEFAULT_OVERLAY_TEXT_COUNT,
        }
    }
}

/// Outcome of reading a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Extracted(ClassificationResult),
    Unparseable { reason: String },
}

impl Extraction {
    pub fn parse(raw: &str) -> Self {
        let cleaned = strip_code_fence(raw);
        let value: Value = match serde_json::from_str(cleaned) {
            Ok(value) => value,
            Err(e) => return Extraction::Unparseable { reason: format!("not JSON: {}", e) },
        };
        let Some(object) = value.as_object() else {
            return Extraction::Unparseable { reason: "expected a JSON object".to_string() };
        };

        let tags = object.get("relevant_tags").or_else(|| object.get("tags"));
        Extraction::Extracted(ClassificationResult {
            description: object.get("description").map(coerce_description).unwrap_or_default(),
            tags: coerce_tags(tags),
            name: object
                .get("name")
                .and_then(Value::as_str)
                .map(|name| name.trim().to_string())
                .unwrap_or_default(),
            overlay_text_count: coerce_count(object.get("number_of_text")),
        })
    }

    pub fn is_extracted(&self) -> bool {
        matches!(self, Extraction::Extracted(_))
    }

    /// The extracted record, or the empty default when nothing could be read.
    pub fn into_result(self) -> ClassificationResult {
        match self {
            Extraction::Extracted(result) => result,
            Extraction::Unparseable { .. } => ClassificationResult::default(),
        }
    }
}

/// Removes a leading ```` ```json ```` (or bare ```` ``` ````) and a trailing ```` ``` ````.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.get(..4) {
            Some(lang) if lang.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
    }
    text = text.trim();
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Trims tags, drops empty ones and removes case-insensitive duplicates,
/// keeping the first spelling seen.
pub fn dedupe_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().to_string())
        .filter(|tag| !tag.is_empty() && seen.insert(tag.to_lowercase()))
        .collect()
}

fn coerce_description(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(Value::as_str)
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

fn coerce_tags(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => dedupe_tags(items.iter().filter_map(Value::as_str)),
        Some(Value::String(list)) => dedupe_tags(list.split(',')),
        _ => Vec::new(),
    }
}

fn coerce_count(value: Option<&Value>) -> u32 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(DEFAULT_OVERLAY_TEXT_COUNT)
}

/// What the model suggested for laying out a caption.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlaySuggestion {
    /// The model produced a finished image.
    Image { mime_type: String, data: Vec<u8> },
    /// The model described a placement.
    Instructions(OverlayInstructions),
    /// Nothing usable came back; default bottom placement.
    Fallback(OverlayInstructions),
}

/// Reads a placement answer. `text` is always the caption that gets drawn.
pub fn parse_overlay_suggestion(raw: &str, text: &str) -> OverlaySuggestion {
    if let Some((mime_type, data)) = find_data_url_image(raw) {
        return OverlaySuggestion::Image { mime_type, data };
    }

    let parsed = serde_json::from_str::<Value>(strip_code_fence(raw))
        .ok()
        .and_then(|mut value| value.get_mut("instructions").map(Value::take))
        .and_then(|instructions| serde_json::from_value::<OverlayInstructions>(instructions).ok());

    match parsed {
        Some(mut instructions) => {
            instructions.text = text.to_string();
            OverlaySuggestion::Instructions(instructions.bounded())
        }
        None => OverlaySuggestion::Fallback(OverlayInstructions::for_text(text)),
    }
}

fn find_data_url_image(raw: &str) -> Option<(String, Vec<u8>)> {
    let start = raw.find("data:image/")?;
    let rest = &raw[start + "data:".len()..];
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    let encoded: String = payload
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
        .collect();
    let data = STANDARD.decode(encoded).ok()?;
    Some((mime_type.to_string(), data))
}

/// Asks the model about images and prompts and reads its answers.
#[derive(Clone)]
pub struct Classifier {
    model: Arc<dyn GenerativeModel>,
}

impl Classifier {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Suggests a description, tags and a name for an uploaded meme image.
    pub async fn classify_image(&self, data: Vec<u8>, mime_type: &str) -> Result<Extraction, ModelError> {
        let raw = self
            .model
            .generate(ModelRequest {
                prompt: CLASSIFY_IMAGE_PROMPT.to_string(),
                image: Some(InlineImage { mime_type: mime_type.to_string(), data }),
            })
            .await?;
        Ok(log_unparseable(Extraction::parse(&raw), "classify_image"))
    }

    /// Derives tags, a scene description and an overlay count from a free-text prompt.
    pub async fn analyze_prompt(&self, prompt: &str) -> Result<Extraction, ModelError> {
        let raw = self
            .model
            .generate(ModelRequest {
                prompt: ANALYZE_PROMPT_TEMPLATE.replace("{prompt}", prompt),
                image: None,
            })
            .await?;
        Ok(log_unparseable(Extraction::parse(&raw), "analyze_prompt"))
    }

    pub async fn suggest_overlay(&self, image: InlineImage, text: &str) -> Result<OverlaySuggestion, ModelError> {
        let raw = self
            .model
            .generate(ModelRequest {
                prompt: OVERLAY_PROMPT_TEMPLATE.replace("{text}", text),
                image: Some(image),
            })
            .await?;
        let suggestion = parse_overlay_suggestion(&raw, text);
        if matches!(suggestion, OverlaySuggestion::Fallback(_)) {
            tracing::warn!("Model placement answer was not usable, using default placement");
        }
        Ok(suggestion)
    }
}

fn log_unparseable(extraction: Extraction, operation: &str) -> Extraction {
    if let Extraction::Unparseable { reason } = &extraction {
        tracing::warn!(%operation, %reason, "Model response could not be parsed");
    }
    extraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{TextPosition, MAX_FONT_SIZE, MAX_STROKE_WIDTH};
    use crate::test_support::CannedModel;

    #[test]
    fn dedupe_is_case_insensitive_and_keeps_first_spelling() {
        assert_eq!(dedupe_tags(["Funny", "funny", "Sad"]), vec!["Funny", "Sad"]);
        assert_eq!(dedupe_tags([" cat ", "CAT", "", "dog"]), vec!["cat", "dog"]);
    }

    #[test]
    fn fenced_block_with_array_description() {
        let raw = "```json {\"description\":[\"a\",\"b\"],\"relevant_tags\":[\"X\",\"x\"]} ```";
        let result = Extraction::parse(raw).into_result();
        assert_eq!(result.description, "a b");
        assert_eq!(result.tags, vec!["X"]);
        assert_eq!(result.overlay_text_count, DEFAULT_OVERLAY_TEXT_COUNT);
    }

    #[test]
    fn non_json_is_unparseable_and_collapses_to_empty() {
        let extraction = Extraction::parse("Sorry, I can't help with that.");
        assert!(!extraction.is_extracted());
        let result = extraction.into_result();
        assert!(result.description.is_empty());
        assert!(result.tags.is_empty());
    }

    #[test]
    fn json_that_is_not_an_object_is_unparseable() {
        assert!(matches!(Extraction::parse("[1, 2, 3]"), Extraction::Unparseable { .. }));
    }

    #[test]
    fn missing_fields_default_individually() {
        let result = Extraction::parse(r#"{"name": " Drake Pointing "}"#).into_result();
        assert_eq!(result.name, "Drake Pointing");
        assert!(result.description.is_empty());
        assert!(result.tags.is_empty());
    }

    #[test]
    fn prompt_analysis_shape_is_understood() {
        let raw = "```JSON\n{\"description\": \"  Two buttons, one sweaty hand. \", \"relevant_tags\": \"choice, dilemma , Choice\", \"number_of_text\": \"3\"}\n```";
        let result = Extraction::parse(raw).into_result();
        assert_eq!(result.description, "Two buttons, one sweaty hand.");
        assert_eq!(result.tags, vec!["choice", "dilemma"]);
        assert_eq!(result.overlay_text_count, 3);
    }

    #[test]
    fn nonsense_overlay_count_falls_back_to_two() {
        let result = Extraction::parse(r#"{"number_of_text": 0}"#).into_result();
        assert_eq!(result.overlay_text_count, 2);
        let result = Extraction::parse(r#"{"number_of_text": "many"}"#).into_result();
        assert_eq!(result.overlay_text_count, 2);
    }

    #[test]
    fn placement_instructions_keep_the_requested_caption() {
        let raw = r#"{"instructions":{"text":"something else","position":"top","fontSize":32}}"#;
        match parse_overlay_suggestion(raw, "my caption") {
            OverlaySuggestion::Instructions(instructions) => {
                assert_eq!(instructions.text, "my caption");
                assert_eq!(instructions.position, TextPosition::Top);
                assert_eq!(instructions.font_size, 32);
            }
            other => panic!("unexpected suggestion: {:?}", other),
        }
    }

    #[test]
    fn placement_values_from_the_model_are_bounded() {
        let raw = r#"{"instructions":{"text":"x","position":"top","fontSize":4294967295,"strokeWidth":3000}}"#;
        match parse_overlay_suggestion(raw, "hi") {
            OverlaySuggestion::Instructions(instructions) => {
                assert_eq!(instructions.font_size, MAX_FONT_SIZE);
                assert_eq!(instructions.stroke_width, MAX_STROKE_WIDTH);
            }
            other => panic!("unexpected suggestion: {:?}", other),
        }
    }

    #[test]
    fn overlay_prompt_shows_the_expected_shape() {
        let prompt = OVERLAY_PROMPT_TEMPLATE.replace("{text}", "hello");
        assert!(prompt.contains(r#"Caption: "hello""#));
        assert!(prompt.contains(r##""strokeColor": "#ffffff""##));
    }

    #[test]
    fn data_url_answer_is_an_image() {
        let raw = "Here you go: data:image/png;base64,AQID\n";
        assert_eq!(
            parse_overlay_suggestion(raw, "x"),
            OverlaySuggestion::Image { mime_type: "image/png".into(), data: vec![1, 2, 3] }
        );
    }

    #[test]
    fn unusable_placement_answer_falls_back_to_bottom() {
        match parse_overlay_suggestion("no idea", "caption") {
            OverlaySuggestion::Fallback(instructions) => {
                assert_eq!(instructions.position, TextPosition::Bottom);
                assert_eq!(instructions.text, "caption");
            }
            other => panic!("unexpected suggestion: {:?}", other),
        }
    }

    #[tokio::test]
    async fn classify_image_sends_the_image_inline() {
        let model = Arc::new(CannedModel::replying(r#"{"description":["A dog."],"relevant_tags":["dog"],"name":"Fine Dog"}"#));
        let classifier = Classifier::new(model.clone());

        let extraction = classifier.classify_image(vec![7, 7], "image/jpeg").await.unwrap();
        assert_eq!(extraction.into_result().name, "Fine Dog");

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        let image = requests[0].image.as_ref().unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, vec![7, 7]);
    }

    #[tokio::test]
    async fn analyze_prompt_embeds_the_prompt() {
        let model = Arc::new(CannedModel::replying("{}"));
        let classifier = Classifier::new(model.clone());
        classifier.analyze_prompt("cat judging my code").await.unwrap();
        assert!(model.requests()[0].prompt.contains("Request: cat judging my code"));
    }
}
