//! Gemini `generateContent` client used for describing and expanding images.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

pub const DESCRIBE_PROMPT: &str = "Describe this image in one or two sentences. Focus on the subject, setting, lighting and style so that an artist could extend the scene beyond its borders.";

#[derive(Error, Debug)]
pub enum GenAiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Generation failed: {message}")]
    Generation { message: String },

    #[error("The model did not return an image")]
    NoImageReturned,
}

/// Builds the instruction sent alongside the padded canvas.
pub fn expansion_prompt(description: &str) -> String {
    let description = description.trim();
    let mut prompt = String::from(
        "Expand this image to fill the transparent areas of the canvas. Keep the existing pixels unchanged and continue the scene seamlessly, matching perspective, lighting and style. Do not add borders or frames.",
    );
    if !description.is_empty() {
        prompt.push_str("\n\nThe image shows: ");
        prompt.push_str(description);
    }
    prompt
}

/// An image sent to or returned by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub base64: String,
}

impl InlineImage {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            base64: STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, GenAiError> {
        Ok(STANDARD.decode(self.base64.as_bytes())?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn parts(self) -> impl Iterator<Item = Part> {
        self.candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
    }

    fn block_reason(&self) -> Option<String> {
        if let Some(reason) = self.prompt_feedback.as_ref().and_then(|f| f.block_reason.clone()) {
            return Some(reason);
        }
        self.candidates
            .iter()
            .filter_map(|c| c.finish_reason.as_deref())
            .find(|reason| !matches!(*reason, "STOP" | "MAX_TOKENS"))
            .map(str::to_string)
    }
}

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GEMINI_API_BASE.to_string(),
            api_key,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_models(mut self, text_model: impl Into<String>, image_model: impl Into<String>) -> Self {
        self.text_model = text_model.into();
        self.image_model = image_model.into();
        self
    }

    /// Asks the text model for a caption of `image`.
    pub async fn describe(&self, image: &InlineImage, prompt: &str) -> Result<String, GenAiError> {
        let request = GenerateContentRequest {
            contents: vec![user_content(image, prompt)],
            generation_config: None,
        };

        let response = self.generate(&self.text_model, &request).await?;
        let block_reason = response.block_reason();
        let text = response
            .parts()
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(GenAiError::Generation {
                message: match block_reason {
                    Some(reason) => format!("no description returned ({})", reason),
                    None => "no description returned".to_string(),
                },
            });
        }
        log::info!("📝 Description received ({} chars)", text.len());
        Ok(text)
    }

    /// Sends the padded PNG and returns the first image the model produces.
    pub async fn expand(&self, padded_png_base64: &str, prompt: &str) -> Result<InlineImage, GenAiError> {
        let padded = InlineImage {
            mime_type: "image/png".to_string(),
            base64: padded_png_base64.to_string(),
        };
        let request = GenerateContentRequest {
            contents: vec![user_content(&padded, prompt)],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            }),
        };

        let response = self.generate(&self.image_model, &request).await?;
        if let Some(reason) = response.block_reason() {
            log::warn!("Expansion finished with reason {}", reason);
        }
        let image = response
            .parts()
            .find_map(|part| part.inline_data)
            .map(|blob| InlineImage {
                mime_type: blob.mime_type,
                base64: blob.data,
            })
            .ok_or(GenAiError::NoImageReturned)?;

        log::info!("🖼 Expanded image received ({})", image.mime_type);
        Ok(image)
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GenAiError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            log::warn!("Gemini returned HTTP {}: {}", status, body);
            return Err(GenAiError::Generation {
                message: format!("HTTP {}: {}", status, error_message(&body)),
            });
        }

        Ok(serde_json::from_str(&response.text().await?)?)
    }
}

fn user_content(image: &InlineImage, prompt: &str) -> Content {
    Content {
        role: Some("user".to_string()),
        parts: vec![
            Part {
                inline_data: Some(Blob {
                    mime_type: image.mime_type.clone(),
                    data: image.base64.clone(),
                }),
                ..Default::default()
            },
            Part {
                text: Some(prompt.to_string()),
                ..Default::default()
            },
        ],
    }
}

/// Pulls `error.message` out of a Google error body, if there is one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
