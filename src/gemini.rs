//! Gemini API client for multimodal text generation.

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::bot::api::Generator;
use crate::bot::message::ImageRef;
use crate::classifier::Tier;
use crate::config::ModelTiers;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    api_base: String,
    api_key: String,
    models: ModelTiers,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String, models: ModelTiers) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout, using defaults: {e}");
                reqwest::Client::new()
            });

        Self {
            api_base: GEMINI_API_BASE.to_string(),
            api_key,
            models,
            client,
        }
    }

    /// Point the client at another endpoint, e.g. a local mock server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn model_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Light => &self.models.light,
            Tier::Capable => &self.models.capable,
        }
    }

    /// Download every image, dropping the ones that fail.
    async fn inline_images(&self, images: &[ImageRef]) -> Vec<InlineData> {
        let mut inline = Vec::with_capacity(images.len());
        for image in images {
            if let Some(data) = fetch_image_base64(&self.client, &image.url).await {
                inline.push(InlineData {
                    mime_type: image.mime_type.clone(),
                    data,
                });
            }
        }
        inline
    }

    /// One `generateContent` call with the prompt followed by inline images.
    pub async fn generate_content(
        &self,
        model: &str,
        prompt: &str,
        images: &[ImageRef],
    ) -> Result<String, String> {
        let inline = self.inline_images(images).await;
        info!("🧠 Calling {model} ({} of {} image(s) attached)", inline.len(), images.len());

        let request = build_request(prompt, inline);
        let url = format!("{}/models/{}:generateContent?key={}", self.api_base, model, self.api_key);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {}", e.without_url()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {e}"))?;

        debug!("Gemini response status: {status}");

        if !status.is_success() {
            return Err(format!("API error {status}: {body}"));
        }

        parse_response(&body)
    }
}

impl Generator for GeminiClient {
    async fn generate(&self, prompt: &str, images: &[ImageRef], tier: Tier) -> Option<String> {
        let model = self.model_for(tier);
        match self.generate_content(model, prompt, images).await {
            Ok(text) => Some(text),
            Err(e) => {
                error!("[Gemini Error] {model} call failed: {e}");
                None
            }
        }
    }
}

/// GET an image and base64-encode the body. Any failure yields `None`.
pub async fn fetch_image_base64(client: &reqwest::Client, url: &str) -> Option<String> {
    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("[Image Fetch Error] Failed to fetch image from {url}: {e}");
            return None;
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!("[Image Fetch Error] {url} returned {status}");
        return None;
    }

    match response.bytes().await {
        Ok(bytes) => {
            debug!("Fetched image {url} ({} bytes)", bytes.len());
            Some(base64::engine::general_purpose::STANDARD.encode(&bytes))
        }
        Err(e) => {
            warn!("[Image Fetch Error] Failed to read image body from {url}: {e}");
            None
        }
    }
}

fn build_request(prompt: &str, images: Vec<InlineData>) -> GenerateRequest {
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(Part::Text {
        text: prompt.to_string(),
    });
    parts.extend(images.into_iter().map(|inline_data| Part::Inline { inline_data }));

    GenerateRequest {
        contents: vec![Content { role: "user", parts }],
    }
}

fn parse_response(body: &str) -> Result<String, String> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| format!("Failed to parse response: {e}"))?;

    if let Some(error) = parsed.error {
        return Err(format!("Gemini error: {}", error.message));
    }

    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(format!("Prompt blocked: {reason}"));
    }

    let candidates = parsed.candidates.ok_or("No candidates in response")?;
    let candidate = candidates.first().ok_or("Empty candidates array")?;
    let content = candidate
        .content
        .as_ref()
        .ok_or("No content in candidate")?;

    let text: String = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect();

    if text.trim().is_empty() {
        return Err("No text in response".to_string());
    }

    Ok(text)
}
