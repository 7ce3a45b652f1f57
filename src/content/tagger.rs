use crate::util::truncate_to_byte_budget;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Largest text (in UTF-8 bytes) the entity service accepts.
pub const TAG_TEXT_BUDGET: usize = 5000;

/// Tag list stored when no entities were detected.
pub const NO_TAGS: &str = "none";

/// Entity types kept as tags.
const ACCEPTED_TYPES: &[&str] = &["ORGANIZATION", "TITLE", "COMMERCIAL_ITEM", "PERSON"];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum TagError {
    #[error("Entity service request timed out")]
    Timeout,
    #[error("Entity service network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Entity service returned status {0}")]
    HttpStatus(u16),
    #[error("Entity service quota exceeded")]
    Throttled,
}

/// Detects named entities in article text.
#[async_trait]
pub trait EntityTagger: Send + Sync {
    /// Returns the distinct organization, title, commercial-item and person
    /// entities found in `text` (at most [`TAG_TEXT_BUDGET`] bytes).
    async fn detect_entities(&self, text: &str, language_code: &str)
        -> Result<Vec<String>, TagError>;
}

/// Tags a post: detects entities in `title + " " + body` trimmed to the
/// byte budget, and joins them with `", "` (or [`NO_TAGS`]).
pub async fn tag_post(
    tagger: &dyn EntityTagger,
    title: &str,
    body: &str,
    language_code: &str,
) -> Result<String, TagError> {
    let mut text = format!("{} {}", title, body);
    truncate_to_byte_budget(&mut text, TAG_TEXT_BUDGET);

    let entities = tagger.detect_entities(&text, language_code).await?;

    let mut tags: Vec<String> = Vec::with_capacity(entities.len());
    for entity in entities {
        if !tags.contains(&entity) {
            tags.push(entity);
        }
    }

    if tags.is_empty() {
        Ok(NO_TAGS.to_string())
    } else {
        Ok(tags.join(", "))
    }
}

/// Tagger used when no entity service is configured; never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledTagger;

#[async_trait]
impl EntityTagger for DisabledTagger {
    async fn detect_entities(&self, _text: &str, _language_code: &str) -> Result<Vec<String>, TagError> {
        Ok(Vec::new())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectRequest<'a> {
    text: &'a str,
    language_code: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectResponse {
    #[serde(default)]
    entities: Vec<DetectedEntity>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectedEntity {
    #[serde(rename = "Type")]
    kind: String,
    text: String,
}

/// [`EntityTagger`] that posts `{"Text", "LanguageCode"}` to an HTTP
/// entity-detection endpoint and reads back `{"Entities": [{"Type", "Text"}]}`.
pub struct HttpEntityTagger {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEntityTagger {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl EntityTagger for HttpEntityTagger {
    async fn detect_entities(
        &self,
        text: &str,
        language_code: &str,
    ) -> Result<Vec<String>, TagError> {
        let request = self.client.post(&self.endpoint).json(&DetectRequest {
            text,
            language_code,
        });

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| TagError::Timeout)??;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TagError::Throttled);
        }
        if !status.is_success() {
            return Err(TagError::HttpStatus(status.as_u16()));
        }

        let body: DetectResponse = response.json().await?;
        let mut found: Vec<String> = Vec::new();
        for entity in body.entities {
            if ACCEPTED_TYPES.contains(&entity.kind.as_str()) && !found.contains(&entity.text) {
                found.push(entity.text);
            }
        }

        tracing::debug!(entities = found.len(), "Entities detected");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct RecordingTagger {
        seen: Mutex<Vec<String>>,
        reply: Vec<String>,
    }

    #[async_trait]
    impl EntityTagger for RecordingTagger {
        async fn detect_entities(&self, text: &str, _lang: &str) -> Result<Vec<String>, TagError> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn test_tag_post_joins_and_dedups() {
        let tagger = RecordingTagger {
            seen: Mutex::new(Vec::new()),
            reply: vec!["AWS".into(), "Lambda".into(), "AWS".into()],
        };
        let tags = tag_post(&tagger, "Title", "Body", "en").await.unwrap();
        assert_eq!(tags, "AWS, Lambda");
        assert_eq!(tagger.seen.lock().unwrap()[0], "Title Body");
    }

    #[tokio::test]
    async fn test_tag_post_none_when_empty() {
        let tags = tag_post(&DisabledTagger, "Title", "Body", "en").await.unwrap();
        assert_eq!(tags, NO_TAGS);
    }

    #[tokio::test]
    async fn test_tag_post_trims_to_budget() {
        let tagger = RecordingTagger {
            seen: Mutex::new(Vec::new()),
            reply: Vec::new(),
        };
        // Multi-byte body far beyond the budget
        let body = "ü".repeat(4000);
        tag_post(&tagger, "Title", &body, "en").await.unwrap();

        let sent = tagger.seen.lock().unwrap()[0].clone();
        assert!(sent.len() <= TAG_TEXT_BUDGET);
        assert!(sent.len() > TAG_TEXT_BUDGET - 2);
        assert!(sent.starts_with("Title ü"));
    }

    #[tokio::test]
    async fn test_http_tagger_filters_types() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"LanguageCode": "en"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Entities": [
                    {"Type": "ORGANIZATION", "Text": "Amazon", "Score": 0.99},
                    {"Type": "DATE", "Text": "Monday"},
                    {"Type": "PERSON", "Text": "Jeff"},
                    {"Type": "ORGANIZATION", "Text": "Amazon"},
                    {"Type": "COMMERCIAL_ITEM", "Text": "Kindle"},
                    {"Type": "LOCATION", "Text": "Seattle"},
                    {"Type": "TITLE", "Text": "Prime Video"}
                ]
            })))
            .mount(&mock_server)
            .await;

        let tagger = HttpEntityTagger::new(reqwest::Client::new(), &mock_server.uri());
        let found = tagger.detect_entities("some text", "en").await.unwrap();
        assert_eq!(found, vec!["Amazon", "Jeff", "Kindle", "Prime Video"]);
    }

    #[tokio::test]
    async fn test_http_tagger_throttled() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&mock_server)
            .await;

        let tagger = HttpEntityTagger::new(reqwest::Client::new(), &mock_server.uri());
        let result = tagger.detect_entities("text", "en").await;
        assert!(matches!(result, Err(TagError::Throttled)));
    }

    #[tokio::test]
    async fn test_http_tagger_server_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let tagger = HttpEntityTagger::new(reqwest::Client::new(), &mock_server.uri());
        let result = tagger.detect_entities("text", "en").await;
        assert!(matches!(result, Err(TagError::HttpStatus(503))));
    }
}
