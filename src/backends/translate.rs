//! Prompt translators

use crate::error::{BannerError, Result};
use crate::inference::Translator;
use async_trait::async_trait;

const SERVICE: &str = "translate";

/// Google translate public endpoint, Korean to English
#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    client: reqwest::Client,
    url: String,
    source: String,
    target: String,
}

impl GoogleTranslator {
    #[must_use]
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            source: "ko".to_string(),
            target: "en".to_string(),
        }
    }

    #[must_use]
    pub fn with_languages(mut self, source: &str, target: &str) -> Self {
        self.source = source.to_string();
        self.target = target.to_string();
        self
    }
}

/// Join the translated segments of a `translate_a/single` reply
///
/// The reply is a nested array whose first element lists
/// `[translated, original, ...]` per sentence.
///
/// # Errors
/// `ExternalService` when the shape is not recognized.
pub fn parse_translation(body: &serde_json::Value) -> Result<String> {
    let segments = body
        .get(0)
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| BannerError::external_service(SERVICE, "unexpected response shape"))?;
    let translated: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(serde_json::Value::as_str))
        .collect();
    if translated.trim().is_empty() {
        return Err(BannerError::external_service(SERVICE, "empty translation"));
    }
    Ok(translated)
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("client", "gtx"),
                ("sl", self.source.as_str()),
                ("tl", self.target.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| BannerError::from_http(SERVICE, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BannerError::external_service(
                SERVICE,
                format!("HTTP {}", status),
            ));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BannerError::external_service(SERVICE, e.to_string()))?;
        parse_translation(&body)
    }
}

/// Leaves text untouched, for backends that accept the source language
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTranslator;

#[async_trait]
impl Translator for PassthroughTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}
