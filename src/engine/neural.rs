//! Neural text-detection/recognition sidecar adapter.
//!
//! Complex scripts (Bengali conjuncts, Arabic ligatures) are where the
//! classic engine is weakest and a detector/recognizer network is strongest.
//! The network runs in a sidecar service; this adapter loads a reader for the
//! page's language set once (through the injected [`EngineCache`]) and then
//! sends page images to it.
//!
//! Wire shape:
//!
//! ```text
//! POST {endpoint}/readers   {"languages": ["bn","en"]}           → {"reader_id": "..."}
//! POST {endpoint}/readtext  {"reader_id", "image", ...params}    → {"detections": [{"text","confidence"}]}
//! ```
//!
//! Confidence is the mean detection score scaled to 0–100.

use super::{
    http_status_error, http_transport_error, with_retry, EngineCache, EngineKey, Recognition,
    Recognizer, RetryPolicy,
};
use crate::error::{EngineError, EngineErrorKind};
use crate::pipeline::{encode, render::PageImage};
use crate::script::ScriptProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const ENGINE: &str = "neural";

/// Languages the sidecar ships models for.
const SUPPORTED: &[&str] = &["bn", "en", "ar"];

/// Detection and grouping parameters sent with every page.
#[derive(Debug, Clone, Serialize)]
pub struct ReadParams {
    pub paragraph: bool,
    pub min_size: u32,
    pub text_threshold: f32,
    pub low_text: f32,
    pub link_threshold: f32,
    pub canvas_size: u32,
    pub mag_ratio: f32,
}

impl Default for ReadParams {
    fn default() -> Self {
        Self {
            paragraph: true,
            min_size: 10,
            text_threshold: 0.7,
            low_text: 0.4,
            link_threshold: 0.4,
            canvas_size: 2560,
            mag_ratio: 1.5,
        }
    }
}

/// A reader loaded in the sidecar for one language set.
#[derive(Debug)]
pub struct NeuralReader {
    reader_id: String,
    languages: Vec<String>,
}

#[derive(Serialize)]
struct LoadRequest<'a> {
    languages: &'a [String],
}

#[derive(Deserialize)]
struct LoadResponse {
    reader_id: String,
}

#[derive(Serialize)]
struct ReadRequest<'a> {
    reader_id: &'a str,
    image: String,
    #[serde(flatten)]
    params: &'a ReadParams,
}

#[derive(Debug, Deserialize)]
struct Detection {
    text: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

/// Languages for a profile, restricted to supported models; English if none remain.
pub fn reader_languages(profile: ScriptProfile) -> Vec<String> {
    let mut langs: Vec<String> = profile
        .languages()
        .into_iter()
        .filter(|l| SUPPORTED.contains(&l.as_str()))
        .collect();
    if langs.is_empty() {
        langs.push("en".to_string());
    }
    langs.sort();
    langs
}

/// Collapse detections into (text, confidence 0–100).
fn assemble(detections: Vec<Detection>) -> (String, f64) {
    let kept: Vec<Detection> = detections
        .into_iter()
        .filter(|d| !d.text.trim().is_empty())
        .collect();
    if kept.is_empty() {
        return (String::new(), 0.0);
    }
    let conf = kept.iter().map(|d| d.confidence * 100.0).sum::<f64>() / kept.len() as f64;
    let text = kept
        .iter()
        .map(|d| d.text.trim())
        .collect::<Vec<_>>()
        .join("\n");
    (text, conf)
}

/// [`Recognizer`] backed by the neural sidecar.
pub struct NeuralRecognizer {
    endpoint: String,
    http: reqwest::Client,
    readers: Arc<EngineCache<NeuralReader>>,
    params: ReadParams,
    retry: RetryPolicy,
}

impl NeuralRecognizer {
    pub fn new(
        endpoint: impl Into<String>,
        readers: Arc<EngineCache<NeuralReader>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            readers,
            params: ReadParams::default(),
            retry,
        }
    }

    async fn reader(&self, languages: Vec<String>) -> Result<Arc<NeuralReader>, EngineError> {
        let key = EngineKey::new(ENGINE, &languages);
        self.readers
            .get_or_try_init(&key, || async {
                let url = format!("{}/readers", self.endpoint);
                let resp = self
                    .http
                    .post(&url)
                    .json(&LoadRequest { languages: &languages })
                    .send()
                    .await
                    .map_err(|e| http_transport_error(ENGINE, e))?;
                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(http_status_error(ENGINE, status, &body));
                }
                let loaded: LoadResponse = resp
                    .json()
                    .await
                    .map_err(|e| http_transport_error(ENGINE, e))?;
                info!("Neural reader loaded for {:?}", languages);
                Ok(Arc::new(NeuralReader {
                    reader_id: loaded.reader_id,
                    languages: languages.clone(),
                }))
            })
            .await
    }

    async fn read_once(&self, reader: &NeuralReader, image_b64: &str) -> Result<ReadResponse, EngineError> {
        let url = format!("{}/readtext", self.endpoint);
        let resp = self
            .http
            .post(&url)
            .json(&ReadRequest {
                reader_id: &reader.reader_id,
                image: image_b64.to_string(),
                params: &self.params,
            })
            .send()
            .await
            .map_err(|e| http_transport_error(ENGINE, e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(http_status_error(ENGINE, status, &body));
        }
        resp.json().await.map_err(|e| http_transport_error(ENGINE, e))
    }
}

#[async_trait]
impl Recognizer for NeuralRecognizer {
    fn name(&self) -> &str {
        ENGINE
    }

    async fn recognize(&self, page: &PageImage, profile: ScriptProfile) -> Result<Recognition, EngineError> {
        let reader = self.reader(reader_languages(profile)).await?;

        let img = Arc::clone(&page.image);
        let b64 = tokio::task::spawn_blocking(move || encode::png_base64(&img))
            .await
            .map_err(|e| EngineError::new(ENGINE, EngineErrorKind::Process, e.to_string()))?
            .map_err(|e| EngineError::new(ENGINE, EngineErrorKind::Process, e.to_string()))?;

        let resp = with_retry(ENGINE, self.retry, || self.read_once(&reader, &b64)).await?;
        let (text, conf) = assemble(resp.detections);
        debug!(
            "neural page {} {:?}: {:.1}% over {} chars",
            page.page_number,
            reader.languages,
            conf,
            text.chars().count()
        );
        Ok(Recognition::new(text, conf, ENGINE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(text: &str, confidence: f64) -> Detection {
        Detection {
            text: text.into(),
            confidence,
        }
    }

    #[test]
    fn assemble_averages_non_empty_detections() {
        let (text, conf) = assemble(vec![det("আমার", 0.9), det("  ", 0.1), det("দেশ", 0.7)]);
        assert_eq!(text, "আমার\nদেশ");
        assert!((conf - 80.0).abs() < 1e-9);
    }

    #[test]
    fn assemble_empty_is_zero() {
        assert_eq!(assemble(vec![]), (String::new(), 0.0));
    }

    #[test]
    fn reader_languages_are_sorted_and_supported() {
        assert_eq!(reader_languages(ScriptProfile::Mixed), vec!["bn", "en"]);
        assert_eq!(reader_languages(ScriptProfile::Bangla), vec!["bn"]);
    }

    #[test]
    fn read_request_flattens_params() {
        let params = ReadParams::default();
        let req = ReadRequest {
            reader_id: "r1",
            image: "AAAA".into(),
            params: &params,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["canvas_size"], 2560);
        assert_eq!(json["paragraph"], true);
        assert_eq!(json["reader_id"], "r1");
    }

    #[tokio::test]
    async fn unreachable_sidecar_is_an_engine_error() {
        let rec = NeuralRecognizer::new(
            "http://127.0.0.1:9",
            Arc::new(EngineCache::new()),
            RetryPolicy {
                max_retries: 0,
                backoff_ms: 1,
            },
        );
        let page = PageImage::new(1, image::DynamicImage::new_luma8(4, 4), 300);
        assert!(rec.recognize(&page, ScriptProfile::Bangla).await.is_err());
    }
}
