//! Keyword-overlap ranking of stored templates against a free-text prompt.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::classification::Classifier;
use crate::domain::TemplateRepository;
use crate::errors::MatchError;
use crate::models::{MemeTemplate, ScoredTemplate};

/// Weights and cap used by the scorer.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingConfig {
    /// Added once per prompt tag found in a template's description or tags.
    pub tag_weight: f64,
    /// Added once per description word found in a template's description.
    pub description_word_weight: f64,
    pub max_results: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            tag_weight: 1.0,
            description_word_weight: 0.5,
            max_results: 5,
        }
    }
}

/// Keywords derived from a prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptKeywords {
    pub tags: Vec<String>,
    pub description: String,
}

impl PromptKeywords {
    pub fn new<I, S>(tags: I, description: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Best first; never empty.
    Matched(Vec<ScoredTemplate>),
    NoMatch,
}

/// Lowercased, trimmed, non-empty prompt tags.
fn normalized_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// Lowercased words of `text`, split on anything that is not `[A-Za-z0-9_]`.
fn description_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

fn score_with(template: &MemeTemplate, tags: &[String], words: &[String], config: &MatchingConfig) -> f64 {
    let description = template.description.as_deref().unwrap_or_default().to_lowercase();
    let template_tags: Vec<String> = template.tags.iter().map(|t| t.to_lowercase()).collect();

    let tag_hits = tags
        .iter()
        .filter(|tag| description.contains(tag.as_str()) || template_tags.iter().any(|t| t.contains(tag.as_str())))
        .count();
    let word_hits = words.iter().filter(|word| description.contains(word.as_str())).count();

    tag_hits as f64 * config.tag_weight + word_hits as f64 * config.description_word_weight
}

/// Score of a single template for the given keywords.
#[cfg(test)]
pub fn score_template(template: &MemeTemplate, keywords: &PromptKeywords, config: &MatchingConfig) -> f64 {
    score_with(
        template,
        &normalized_tags(&keywords.tags),
        &description_words(&keywords.description),
        config,
    )
}

/// Scores every template, keeps the positive ones and returns the best
/// `max_results`. Equal scores keep their input order.
pub fn rank_templates(templates: Vec<MemeTemplate>, keywords: &PromptKeywords, config: &MatchingConfig) -> Vec<ScoredTemplate> {
    let tags = normalized_tags(&keywords.tags);
    let words = description_words(&keywords.description);

    let mut scored: Vec<ScoredTemplate> = templates
        .into_iter()
        .map(|template| {
            let score = score_with(&template, &tags, &words, config);
            ScoredTemplate { template, score }
        })
        .filter(|scored| scored.score > 0.0)
        .collect();

    // sort_by is stable.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored.truncate(config.max_results);
    scored
}

/// Matches prompts to stored templates.
#[derive(Clone)]
pub struct TemplateMatcher {
    classifier: Classifier,
    templates: Arc<dyn TemplateRepository>,
    config: MatchingConfig,
}

impl TemplateMatcher {
    pub fn new(classifier: Classifier, templates: Arc<dyn TemplateRepository>, config: MatchingConfig) -> Self {
        Self { classifier, templates, config }
    }

    pub async fn match_prompt(&self, prompt: &str) -> Result<MatchOutcome, MatchError> {
        let extraction = self
            .classifier
            .analyze_prompt(prompt)
            .await
            .map_err(MatchError::Extraction)?;
        let derived = extraction.into_result();
        tracing::debug!(tags = ?derived.tags, description = %derived.description, "Derived prompt keywords");
        let keywords = PromptKeywords::new(derived.tags, derived.description);

        let templates = self.templates.list_all().await.map_err(MatchError::Fetch)?;
        let candidates = templates.len();

        let ranked = rank_templates(templates, &keywords, &self.config);
        tracing::info!(candidates, matched = ranked.len(), "Scored templates for prompt");

        if ranked.is_empty() {
            Ok(MatchOutcome::NoMatch)
        } else {
            Ok(MatchOutcome::Matched(ranked))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{template, CannedModel, InMemoryTemplates};

    #[test]
    fn single_tag_hit_scores_one() {
        let drake = template("Drake", &["drake"], Some("drake meme"));
        let keywords = PromptKeywords::new(["drake"], "");
        assert_eq!(score_template(&drake, &keywords, &MatchingConfig::default()), 1.0);

        let ranked = rank_templates(vec![drake], &keywords, &MatchingConfig::default());
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn tag_substring_of_template_tag_counts() {
        let harold = template("Harold", &["hide the pain"], None);
        let keywords = PromptKeywords::new(["Pain"], "");
        assert_eq!(score_template(&harold, &keywords, &MatchingConfig::default()), 1.0);
    }

    #[test]
    fn description_words_add_half_a_point_each() {
        let dog = template("This is Fine", &["chaos"], Some("Dog in burning room"));
        let keywords = PromptKeywords::new(Vec::<String>::new(), "A dog sits in a burning room!");
        // dog, in, burning, room hit; "a" and "sits" miss.
        assert_eq!(score_template(&dog, &keywords, &MatchingConfig::default()), 2.0);
    }

    #[test]
    fn no_overlap_means_nothing_is_returned() {
        let templates = vec![
            template("Drake", &["drake"], Some("drake meme")),
            template("Cat", &["cat"], Some("woman yelling at cat")),
        ];
        let keywords = PromptKeywords::new(["spaceship"], "orbiting jupiter");
        assert!(rank_templates(templates, &keywords, &MatchingConfig::default()).is_empty());
    }

    #[test]
    fn results_are_capped_positive_and_sorted() {
        let mut templates: Vec<_> = (0..8).map(|i| template(&format!("t{}", i), &["choice"], None)).collect();
        templates.push(template("best", &["choice", "decision"], Some("a hard decision")));
        let keywords = PromptKeywords::new(["choice", "decision"], "");

        let ranked = rank_templates(templates, &keywords, &MatchingConfig::default());
        assert_eq!(ranked.len(), 5);
        assert!(ranked.iter().all(|s| s.score > 0.0));
        assert_eq!(ranked[0].template.name, "best");
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn ties_keep_fetch_order() {
        let templates = vec![
            template("first", &["cat"], None),
            template("second", &["cat"], None),
            template("third", &["cat"], None),
        ];
        let ranked = rank_templates(templates, &PromptKeywords::new(["cat"], ""), &MatchingConfig::default());
        let names: Vec<_> = ranked.iter().map(|s| s.template.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn weights_and_cap_are_configurable() {
        let config = MatchingConfig { tag_weight: 3.0, description_word_weight: 0.0, max_results: 1 };
        let templates = vec![
            template("a", &["cat"], Some("cat")),
            template("b", &["cat"], Some("cat")),
        ];
        let ranked = rank_templates(templates, &PromptKeywords::new(["cat"], "cat"), &config);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 3.0);
    }

    #[tokio::test]
    async fn match_prompt_ranks_stored_templates() {
        let store = Arc::new(InMemoryTemplates::with(vec![
            template("Drake", &["drake", "choice"], Some("drake meme")),
            template("Cat", &["cat"], Some("woman yelling at cat")),
        ]));
        let model = Arc::new(CannedModel::replying(r#"{"description":"drake picks","relevant_tags":["drake","choice"]}"#));
        let matcher = TemplateMatcher::new(Classifier::new(model), store, MatchingConfig::default());

        match matcher.match_prompt("drake choosing rust").await.unwrap() {
            MatchOutcome::Matched(ranked) => {
                assert_eq!(ranked.len(), 1);
                assert_eq!(ranked[0].template.name, "Drake");
                assert_eq!(ranked[0].score, 2.5);
            }
            MatchOutcome::NoMatch => panic!("expected a match"),
        }
    }

    #[tokio::test]
    async fn unparseable_model_answer_is_no_match() {
        let store = Arc::new(InMemoryTemplates::with(vec![template("Drake", &["drake"], Some("drake meme"))]));
        let model = Arc::new(CannedModel::replying("I am not JSON"));
        let matcher = TemplateMatcher::new(Classifier::new(model), store, MatchingConfig::default());
        assert_eq!(matcher.match_prompt("anything").await.unwrap(), MatchOutcome::NoMatch);
    }

    #[tokio::test]
    async fn model_failure_is_an_extraction_error() {
        let store = Arc::new(InMemoryTemplates::default());
        let model = Arc::new(CannedModel::failing());
        let matcher = TemplateMatcher::new(Classifier::new(model), store, MatchingConfig::default());
        assert!(matches!(matcher.match_prompt("x").await, Err(MatchError::Extraction(_))));
    }

    #[tokio::test]
    async fn store_failure_is_a_fetch_error() {
        let store = Arc::new(InMemoryTemplates::failing());
        let model = Arc::new(CannedModel::replying(r#"{"relevant_tags":["x"]}"#));
        let matcher = TemplateMatcher::new(Classifier::new(model), store, MatchingConfig::default());
        assert!(matches!(matcher.match_prompt("x").await, Err(MatchError::Fetch(_))));
    }
}
