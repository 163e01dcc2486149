use crate::{
    domain::{GeneratedMemeRepository, TemplateRepository},
    errors::RepoError,
    models::{GeneratedMeme, MemeTemplate, NewTemplate, TemplateUpdate},
};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::SdkError,
    types::{AttributeValue, ReturnValue},
    Client as DynamoDbClient,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{self, info};
use uuid::Uuid;

type Item = HashMap<String, AttributeValue>;

pub const TEMPLATE_KEY: &str = "template_id";
pub const GENERATED_MEME_KEY: &str = "generated_meme_id";

#[derive(Debug, Clone)]
pub struct DynamoDbTemplateRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbTemplateRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbTemplateRepository");
        Self { client, table_name }
    }

    /// Scans the whole table, following LastEvaluatedKey until exhausted.
    async fn scan_items(&self) -> Result<Vec<Item>, RepoError> {
        let mut items = Vec::new();
        let mut last_evaluated_key: Option<Item> = None;

        loop {
            let resp = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(last_evaluated_key.take())
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::BackendError)?;

            let page = resp.items.unwrap_or_default();
            tracing::debug!("DynamoDB Scan (table: {}): Returned {} items", self.table_name, page.len());
            items.extend(page);

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl TemplateRepository for DynamoDbTemplateRepository {
    async fn create(&self, new: NewTemplate) -> Result<MemeTemplate, RepoError> {
        let now = Utc::now();
        let template = MemeTemplate {
            id: Uuid::new_v4(),
            name: new.name,
            image_url: new.image_url,
            description: new.description,
            tags: new.tags,
            created_at: now,
            updated_at: now,
        };

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(template_to_item(&template)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put template (id: {})", self.table_name, template.id))
            .map_err(RepoError::BackendError)?;

        tracing::debug!(template_id = %template.id, table_name = %self.table_name, "DynamoDB: Template stored");
        Ok(template)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemeTemplate>, RepoError> {
        let id_str = id.to_string();
        let resp = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(TEMPLATE_KEY, AttributeValue::S(id_str.clone()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to get template (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;

        match resp.item {
            Some(item) => item_to_template(&item).map(Some).ok_or_else(|| {
                tracing::error!(template_id = %id_str, table_name = %self.table_name, "DynamoDB: Retrieved item but failed to parse into MemeTemplate");
                RepoError::DataCorruption(format!(
                    "Failed to parse template retrieved from DynamoDB table '{}' for id {}",
                    self.table_name, id_str
                ))
            }),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<MemeTemplate>, RepoError> {
        tracing::debug!("DynamoDB: Scanning table '{}' for all templates", self.table_name);
        let mut templates = Vec::new();
        for item in self.scan_items().await? {
            match item_to_template(&item) {
                Some(template) => templates.push(template),
                None => {
                    let item_id = item.get(TEMPLATE_KEY).and_then(|v| v.as_s().ok());
                    tracing::error!(item.id = ?item_id, table_name = %self.table_name, "DynamoDB: Failed to parse item from scan into MemeTemplate");
                    return Err(RepoError::DataCorruption(format!(
                        "DynamoDB: Failed to parse item {:?} during scan of table '{}'",
                        item_id, self.table_name
                    )));
                }
            }
        }
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        info!("DynamoDB (table: {}): Successfully listed {} templates", self.table_name, templates.len());
        Ok(templates)
    }

    async fn update(&self, id: Uuid, update: TemplateUpdate) -> Result<Option<MemeTemplate>, RepoError> {
        let id_str = id.to_string();
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key(TEMPLATE_KEY, AttributeValue::S(id_str.clone()))
            .condition_expression("attribute_exists(#key)")
            .expression_attribute_names("#key", TEMPLATE_KEY)
            .expression_attribute_names("#name", "name")
            .expression_attribute_names("#tags", "tags")
            .expression_attribute_names("#description", "description")
            .expression_attribute_names("#updated_at", "updated_at")
            .expression_attribute_values(":name", AttributeValue::S(update.name))
            .expression_attribute_values(":tags", tags_to_attribute(&update.tags))
            .expression_attribute_values(":updated_at", AttributeValue::S(Utc::now().to_rfc3339()))
            .return_values(ReturnValue::AllNew);

        request = match update.description {
            Some(description) => request
                .update_expression("SET #name = :name, #tags = :tags, #description = :description, #updated_at = :updated_at")
                .expression_attribute_values(":description", AttributeValue::S(description)),
            None => request.update_expression("SET #name = :name, #tags = :tags, #updated_at = :updated_at REMOVE #description"),
        };

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(SdkError::ServiceError(service_err)) if service_err.err().is_conditional_check_failed_exception() => {
                tracing::debug!(template_id = %id_str, "DynamoDB: Update skipped, template does not exist");
                return Ok(None);
            }
            Err(e) => {
                return Err(RepoError::BackendError(anyhow::Error::new(e).context(format!(
                    "DynamoDB (table: {}): Failed to update template (id: {})",
                    self.table_name, id_str
                ))));
            }
        };

        let attributes = resp.attributes.unwrap_or_default();
        item_to_template(&attributes).map(Some).ok_or_else(|| {
            RepoError::DataCorruption(format!(
                "Failed to parse updated template from DynamoDB table '{}' for id {}",
                self.table_name, id_str
            ))
        })
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let id_str = id.to_string();
        tracing::debug!(template_id = %id_str, table_name = %self.table_name, "DynamoDB: Deleting item");

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(TEMPLATE_KEY, AttributeValue::S(id_str.clone()))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to delete template (id: {})", self.table_name, id_str))
            .map_err(RepoError::BackendError)?;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DynamoDbGeneratedMemeRepository {
    client: DynamoDbClient,
    table_name: String,
}

impl DynamoDbGeneratedMemeRepository {
    pub fn new(client: DynamoDbClient, table_name: String) -> Self {
        info!(%table_name, "Initializing DynamoDbGeneratedMemeRepository");
        Self { client, table_name }
    }
}

#[async_trait]
impl GeneratedMemeRepository for DynamoDbGeneratedMemeRepository {
    async fn create(&self, meme: &GeneratedMeme) -> Result<(), RepoError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(generated_meme_to_item(meme)))
            .send()
            .await
            .context(format!("DynamoDB (table: {}): Failed to put generated meme (id: {})", self.table_name, meme.id))
            .map_err(RepoError::BackendError)?;
        Ok(())
    }

    async fn list_recent(&self) -> Result<Vec<GeneratedMeme>, RepoError> {
        let mut memes = Vec::new();
        let mut last_evaluated_key: Option<Item> = None;

        loop {
            let resp = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(last_evaluated_key.take())
                .send()
                .await
                .context(format!("DynamoDB: Failed to scan table '{}'", self.table_name))
                .map_err(RepoError::BackendError)?;

            for item in resp.items.unwrap_or_default() {
                let meme = item_to_generated_meme(&item).ok_or_else(|| {
                    RepoError::DataCorruption(format!(
                        "DynamoDB: Failed to parse generated meme during scan of table '{}'",
                        self.table_name
                    ))
                })?;
                memes.push(meme);
            }

            last_evaluated_key = resp.last_evaluated_key;
            if last_evaluated_key.is_none() {
                break;
            }
        }

        memes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(memes)
    }
}

fn tags_to_attribute(tags: &[String]) -> AttributeValue {
    // A list keeps insertion order; a string set would not.
    AttributeValue::L(tags.iter().cloned().map(AttributeValue::S).collect())
}

fn parse_timestamp(item: &Item, key: &str) -> Option<DateTime<Utc>> {
    let raw = item.get(key)?.as_s().ok()?;
    DateTime::parse_from_rfc3339(raw).ok().map(|ts| ts.with_timezone(&Utc))
}

fn string_field(item: &Item, key: &str) -> Option<String> {
    item.get(key)?.as_s().ok().cloned()
}

fn template_to_item(template: &MemeTemplate) -> Item {
    let mut item = HashMap::new();
    item.insert(TEMPLATE_KEY.to_string(), AttributeValue::S(template.id.to_string()));
    item.insert("name".to_string(), AttributeValue::S(template.name.clone()));
    item.insert("image_url".to_string(), AttributeValue::S(template.image_url.clone()));
    if let Some(description) = &template.description {
        item.insert("description".to_string(), AttributeValue::S(description.clone()));
    }
    item.insert("tags".to_string(), tags_to_attribute(&template.tags));
    item.insert("created_at".to_string(), AttributeValue::S(template.created_at.to_rfc3339()));
    item.insert("updated_at".to_string(), AttributeValue::S(template.updated_at.to_rfc3339()));
    item
}

fn item_to_template(item: &Item) -> Option<MemeTemplate> {
    let id = item
        .get(TEMPLATE_KEY)?
        .as_s()
        .ok()
        .and_then(|s| Uuid::parse_str(s).ok())?;
    let tags = match item.get("tags") {
        Some(AttributeValue::L(values)) => values
            .iter()
            .filter_map(|v| v.as_s().ok().cloned())
            .collect(),
        // Rows written by older tooling may carry a string set.
        Some(AttributeValue::Ss(values)) => values.clone(),
        _ => Vec::new(),
    };

    Some(MemeTemplate {
        id,
        name: string_field(item, "name")?,
        image_url: string_field(item, "image_url")?,
        description: string_field(item, "description"),
        tags,
        created_at: parse_timestamp(item, "created_at")?,
        updated_at: parse_timestamp(item, "updated_at")?,
    })
}

fn generated_meme_to_item(meme: &GeneratedMeme) -> Item {
    let mut item = HashMap::new();
    item.insert(GENERATED_MEME_KEY.to_string(), AttributeValue::S(meme.id.to_string()));
    item.insert("prompt".to_string(), AttributeValue::S(meme.prompt.clone()));
    if let Some(template_id) = meme.template_id {
        item.insert("template_id".to_string(), AttributeValue::S(template_id.to_string()));
    }
    item.insert("image_url".to_string(), AttributeValue::S(meme.image_url.clone()));
    item.insert("created_at".to_string(), AttributeValue::S(meme.created_at.to_rfc3339()));
    item
}

fn item_to_generated_meme(item: &Item) -> Option<GeneratedMeme> {
    let id = Uuid::parse_str(item.get(GENERATED_MEME_KEY)?.as_s().ok()?).ok()?;
    let template_id = match string_field(item, "template_id") {
        Some(raw) => Some(Uuid::parse_str(&raw).ok()?),
        None => None,
    };

    Some(GeneratedMeme {
        id,
        prompt: string_field(item, "prompt")?,
        template_id,
        image_url: string_field(item, "image_url")?,
        created_at: parse_timestamp(item, "created_at")?,
    })
}
