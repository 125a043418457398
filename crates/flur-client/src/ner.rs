use std::time::Duration;

use flur_core::error::AppError;
use flur_core::traits::{EntityRecognizer, RecognizedEntity};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_NER_MODEL: &str = "de_core_news_lg";

const NER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct NerRequest<'a> {
    model: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct NerResponse {
    #[serde(default)]
    entities: Vec<RecognizedEntity>,
}

/// Client for an external NER service.
///
/// [`connect`](Self::connect) verifies the model is loaded, so a worker
/// without working PII detection never starts. Every failure after that is a
/// [`AppError::PrivacyError`].
#[derive(Clone)]
pub struct HttpEntityRecognizer {
    client: Client,
    base_url: String,
    model: String,
}

impl HttpEntityRecognizer {
    pub async fn connect(
        client: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, AppError> {
        let base_url: String = base_url.into();
        let recognizer = Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        };

        let url = format!("{}/models/{}", recognizer.base_url, recognizer.model);
        let response = recognizer
            .client
            .get(&url)
            .timeout(NER_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                AppError::PrivacyError(format!("NER service unreachable at {url}: {e}"))
            })?;
        if !response.status().is_success() {
            return Err(AppError::PrivacyError(format!(
                "NER model '{}' not available (HTTP {})",
                recognizer.model,
                response.status().as_u16()
            )));
        }

        tracing::info!(model = %recognizer.model, "NER model loaded");
        Ok(recognizer)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl EntityRecognizer for HttpEntityRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<RecognizedEntity>, AppError> {
        let response = self
            .client
            .post(format!("{}/ner", self.base_url))
            .json(&NerRequest {
                model: &self.model,
                text,
            })
            .timeout(NER_TIMEOUT)
            .send()
            .await
            .map_err(|e| AppError::PrivacyError(format!("NER request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::PrivacyError(format!(
                "NER service returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: NerResponse = response
            .json()
            .await
            .map_err(|e| AppError::PrivacyError(format!("Malformed NER response: {e}")))?;
        Ok(body.entities)
    }
}
