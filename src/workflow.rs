//! The upload → describe → compose → expand sequence behind the UI.
//!
//! Async work is handed out as jobs tagged with a ticket; results whose
//! ticket is no longer current (the user picked another image or reset)
//! are ignored.

use crate::compositor::{self, AspectRatio, ComposeError};
use crate::genai_client::{expansion_prompt, GeminiClient, GenAiError, InlineImage, DESCRIBE_PROMPT};
use image::ImageFormat;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum WorkflowError {
    #[error("Select an image first")]
    NoSource,

    #[error("Please wait for the current step to finish")]
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Empty,
    Describing,
    Ready,
    Expanding,
    Expanded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SourceImage {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl SourceImage {
    /// Decodes `bytes` once to validate them and read the dimensions.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<Self, ComposeError> {
        let decoded = compositor::load_source(&bytes)?;
        let mime_type = match mime_type {
            Some(mime) if mime.starts_with("image/") => mime.to_string(),
            _ => guess_mime_type(&bytes).to_string(),
        };
        Ok(Self {
            name: name.into(),
            mime_type,
            width: decoded.width(),
            height: decoded.height(),
            bytes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExpandedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl ExpandedImage {
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DescribeJob {
    pub ticket: u64,
    pub image: InlineImage,
}

#[derive(Debug, Clone)]
pub struct ExpandJob {
    pub ticket: u64,
    pub source: Vec<u8>,
    pub aspect_ratio: AspectRatio,
    pub max_dimension: u32,
    pub prompt: String,
}

#[derive(Debug)]
pub struct Workflow {
    source: Option<SourceImage>,
    pub description: String,
    pub aspect_ratio: AspectRatio,
    max_dimension: u32,
    result: Option<ExpandedImage>,
    stage: Stage,
    ticket: u64,
}

impl Workflow {
    pub fn new(max_dimension: u32) -> Self {
        Self {
            source: None,
            description: String::new(),
            aspect_ratio: AspectRatio::default(),
            max_dimension,
            result: None,
            stage: Stage::Empty,
            ticket: 0,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn result(&self) -> Option<&ExpandedImage> {
        self.result.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.stage, Stage::Describing | Stage::Expanding)
    }

    pub fn can_expand(&self) -> bool {
        self.source.is_some() && !self.is_busy()
    }

    /// Replaces the source image and starts describing it.
    pub fn load_source(&mut self, source: SourceImage) -> DescribeJob {
        log::info!(
            "Loaded source {} ({}x{}, {})",
            source.name,
            source.width,
            source.height,
            source.mime_type
        );
        let image = InlineImage::from_bytes(source.mime_type.clone(), &source.bytes);
        self.source = Some(source);
        self.description.clear();
        self.result = None;
        self.begin_describe(image)
    }

    /// Retries the description of the current source.
    pub fn retry_describe(&mut self) -> Result<DescribeJob, WorkflowError> {
        let source = self.source.as_ref().ok_or(WorkflowError::NoSource)?;
        if self.is_busy() {
            return Err(WorkflowError::Busy);
        }
        let image = InlineImage::from_bytes(source.mime_type.clone(), &source.bytes);
        Ok(self.begin_describe(image))
    }

    fn begin_describe(&mut self, image: InlineImage) -> DescribeJob {
        self.stage = Stage::Describing;
        DescribeJob {
            ticket: self.next_ticket(),
            image,
        }
    }

    pub fn finish_describe(&mut self, ticket: u64, result: Result<String, String>) -> bool {
        if ticket != self.ticket || self.stage != Stage::Describing {
            return false;
        }
        match result {
            Ok(description) => {
                self.description = description;
                self.stage = Stage::Ready;
            }
            Err(message) => self.stage = Stage::Failed(message),
        }
        true
    }

    pub fn begin_expand(&mut self) -> Result<ExpandJob, WorkflowError> {
        let source = self.source.as_ref().ok_or(WorkflowError::NoSource)?;
        if self.is_busy() {
            return Err(WorkflowError::Busy);
        }
        let job = ExpandJob {
            ticket: 0,
            source: source.bytes.clone(),
            aspect_ratio: self.aspect_ratio,
            max_dimension: self.max_dimension,
            prompt: expansion_prompt(&self.description),
        };
        self.result = None;
        self.stage = Stage::Expanding;
        Ok(ExpandJob {
            ticket: self.next_ticket(),
            ..job
        })
    }

    pub fn finish_expand(&mut self, ticket: u64, result: Result<ExpandedImage, String>) -> bool {
        if ticket != self.ticket || self.stage != Stage::Expanding {
            return false;
        }
        match result {
            Ok(image) => {
                log::info!("✅ Expansion finished ({}x{})", image.width, image.height);
                self.result = Some(image);
                self.stage = Stage::Expanded;
            }
            Err(message) => self.stage = Stage::Failed(message),
        }
        true
    }

    /// Tags a source fetch that runs outside the workflow (a Drive
    /// download). Its result is only wanted while [`Self::is_current`]
    /// still holds for the ticket; a reset or a newer job supersedes it.
    pub fn begin_fetch(&mut self) -> Result<u64, WorkflowError> {
        if self.is_busy() {
            return Err(WorkflowError::Busy);
        }
        Ok(self.next_ticket())
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        ticket == self.ticket
    }

    /// Surfaces a failure that happened outside a job (e.g. a bad upload).
    pub fn fail(&mut self, message: impl Into<String>) {
        self.next_ticket();
        self.stage = Stage::Failed(message.into());
    }

    /// Leaves the error state, keeping the loaded source if any.
    pub fn dismiss_error(&mut self) {
        if matches!(self.stage, Stage::Failed(_)) {
            self.stage = match (&self.source, &self.result) {
                (_, Some(_)) => Stage::Expanded,
                (Some(_), None) => Stage::Ready,
                (None, None) => Stage::Empty,
            };
        }
    }

    pub fn reset(&mut self) {
        let max_dimension = self.max_dimension;
        let ticket = self.ticket;
        *self = Self::new(max_dimension);
        // outstanding jobs must not land on the fresh state
        self.ticket = ticket + 1;
    }

    fn next_ticket(&mut self) -> u64 {
        self.ticket += 1;
        self.ticket
    }
}

/// Runs a description job, converting failures to a user-facing message.
pub async fn run_describe(client: &GeminiClient, job: &DescribeJob) -> Result<String, String> {
    client.describe(&job.image, DESCRIBE_PROMPT).await.map_err(|e| {
        log::error!("❌ Description failed: {}", e);
        genai_user_message(&e)
    })
}

/// Composes the padded canvas and asks the model to fill it.
pub async fn run_expand(client: &GeminiClient, job: &ExpandJob) -> Result<ExpandedImage, String> {
    let source = job.source.clone();
    let (aspect_ratio, max_dimension) = (job.aspect_ratio, job.max_dimension);
    let composed = tokio::task::spawn_blocking(move || {
        compositor::compose_png(&source, aspect_ratio, max_dimension)
    })
    .await
    .map_err(|e| format!("Compositing was interrupted: {}", e))?
    .map_err(|e| {
        log::error!("❌ Compositing failed: {}", e);
        compose_user_message(&e)
    })?;

    let padded = InlineImage::from_bytes("image/png", &composed.png);
    let generated = client.expand(&padded.base64, &job.prompt).await.map_err(|e| {
        log::error!("❌ Expansion failed: {}", e);
        genai_user_message(&e)
    })?;

    let bytes = generated.decode().map_err(|e| genai_user_message(&e))?;
    let decoded = compositor::load_source(&bytes).map_err(|e| compose_user_message(&e))?;
    Ok(ExpandedImage {
        width: decoded.width(),
        height: decoded.height(),
        mime_type: generated.mime_type,
        bytes,
    })
}

pub fn genai_user_message(error: &GenAiError) -> String {
    match error {
        GenAiError::NoImageReturned => {
            "The model did not return an image. Please try again.".to_string()
        }
        _ => "Something went wrong while talking to the AI service. Please try again.".to_string(),
    }
}

pub fn compose_user_message(error: &ComposeError) -> String {
    match error {
        ComposeError::SourceImageLoad(_) => {
            "The image could not be loaded. Try a different file.".to_string()
        }
        other => format!("Could not prepare the canvas: {}", other),
    }
}

fn guess_mime_type(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        Ok(ImageFormat::Tiff) => "image/tiff",
        _ => "image/png",
    }
}
