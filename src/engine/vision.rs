//! Cloud vision recognizer: the local stack's per-page remote fallback.
//!
//! Sends one page as a PNG (JPEG when the PNG is over the upload limit) and
//! reads back text with token-level scores.
//! Confidence is the mean token score × 100; a response with text but no
//! token scores is treated as near-certain (99), matching how the service
//! omits scores for clean digital text.

use super::{
    http_status_error, http_transport_error, with_retry, Recognition, Recognizer, RetryPolicy,
};
use crate::error::{EngineError, EngineErrorKind};
use crate::pipeline::{encode, render::PageImage};
use crate::script::ScriptProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const ENGINE: &str = "vision";

/// Confidence reported when the service returns no token scores.
const UNSCORED_CONFIDENCE: f64 = 99.0;

/// Raw image bytes accepted per request.
const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Serialize)]
struct VisionRequest<'a> {
    content: &'a str,
    mime_type: &'static str,
    languages: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Token {
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    tokens: Vec<Token>,
}

fn token_confidence(resp: &VisionResponse) -> f64 {
    let scores: Vec<f64> = resp.tokens.iter().filter_map(|t| t.confidence).collect();
    if scores.is_empty() {
        return if resp.text.trim().is_empty() {
            0.0
        } else {
            UNSCORED_CONFIDENCE
        };
    }
    scores.iter().sum::<f64>() / scores.len() as f64 * 100.0
}

/// [`Recognizer`] for the cloud vision API.
pub struct VisionRecognizer {
    endpoint: String,
    api_key: Option<String>,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl VisionRecognizer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, retry: RetryPolicy) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            http: reqwest::Client::new(),
            retry,
        }
    }

    async fn call(
        &self,
        content: &str,
        mime_type: &'static str,
        languages: &[String],
    ) -> Result<VisionResponse, EngineError> {
        let mut req = self.http.post(&self.endpoint).json(&VisionRequest {
            content,
            mime_type,
            languages: languages.to_vec(),
        });
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|e| http_transport_error(ENGINE, e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(http_status_error(ENGINE, status, &body));
        }
        resp.json().await.map_err(|e| http_transport_error(ENGINE, e))
    }
}

#[async_trait]
impl Recognizer for VisionRecognizer {
    fn name(&self) -> &str {
        ENGINE
    }

    async fn recognize(&self, page: &PageImage, profile: ScriptProfile) -> Result<Recognition, EngineError> {
        let img = Arc::clone(&page.image);
        let payload = tokio::task::spawn_blocking(move || encode::payload(&img, MAX_IMAGE_BYTES))
            .await
            .map_err(|e| EngineError::new(ENGINE, EngineErrorKind::Process, e.to_string()))?
            .map_err(|e| EngineError::new(ENGINE, EngineErrorKind::Process, e.to_string()))?;
        let content = payload.base64();
        let languages = profile.languages();

        let resp = with_retry(ENGINE, self.retry, || self.call(&content, payload.mime_type, &languages)).await?;
        let conf = token_confidence(&resp);
        debug!(
            "vision page {}: {:.1}% over {} tokens",
            page.page_number,
            conf,
            resp.tokens.len()
        );
        Ok(Recognition::new(resp.text.trim(), conf, ENGINE))
    }
}
