//! In-process providers for offline development and tests.

use crate::{
    error::{ImagenioError, Result},
    models::{CaptionOptions, GeneratedImage, ImageGenerationOptions},
    providers::{CaptionProvider, ImageProvider},
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Returns as many images as asked for, unless a script says otherwise.
///
/// Each scripted entry caps how many images the matching call returns, which
/// simulates provider-side filtering. Once the script runs out every call is
/// served in full.
#[derive(Default)]
pub struct MockImageProvider {
    script: Mutex<VecDeque<u32>>,
    requests: Mutex<Vec<u32>>,
    fail_with: Option<String>,
}

impl MockImageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(returned_per_call: impl IntoIterator<Item = u32>) -> Self {
        Self {
            script: Mutex::new(returned_per_call.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// Batch sizes requested so far, in call order.
    pub fn requests(&self) -> Vec<u32> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.requests().len()
    }
}

#[async_trait]
impl ImageProvider for MockImageProvider {
    async fn generate(
        &self,
        prompt: &str,
        count: u32,
        _options: &ImageGenerationOptions,
    ) -> Result<Vec<GeneratedImage>> {
        let call_index = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| ImagenioError::ExternalServiceError("mock poisoned".into()))?;
            requests.push(count);
            requests.len()
        };

        if let Some(message) = &self.fail_with {
            return Err(ImagenioError::ExternalServiceError(message.clone()));
        }

        let returned = self
            .script
            .lock()
            .map_err(|_| ImagenioError::ExternalServiceError("mock poisoned".into()))?
            .pop_front()
            .unwrap_or(count);

        Ok((0..returned)
            .map(|i| {
                let mut bytes = PNG_SIGNATURE.to_vec();
                bytes.extend_from_slice(format!("{}#{}.{}", prompt, call_index, i).as_bytes());
                GeneratedImage::png(bytes)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Answers with a fenced JSON array holding one entry per image, or with a
/// fixed reply when one is configured.
#[derive(Default)]
pub struct MockCaptionProvider {
    reply: Option<String>,
    fail_with: Option<String>,
    calls: Mutex<Vec<(usize, String)>>,
}

impl MockCaptionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Self::default()
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::default()
        }
    }

    /// `(image count, instruction)` of every call so far.
    pub fn calls(&self) -> Vec<(usize, String)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CaptionProvider for MockCaptionProvider {
    async fn caption(
        &self,
        images: &[GeneratedImage],
        instruction: &str,
        _options: &CaptionOptions,
    ) -> Result<String> {
        self.calls
            .lock()
            .map_err(|_| ImagenioError::ExternalServiceError("mock poisoned".into()))?
            .push((images.len(), instruction.to_string()));

        if let Some(message) = &self.fail_with {
            return Err(ImagenioError::ExternalServiceError(message.clone()));
        }
        if let Some(reply) = &self.reply {
            return Ok(reply.clone());
        }

        let entries: Vec<_> = (1..=images.len())
            .map(|n| {
                json!({
                    "title": format!("Image {}", n),
                    "info": format!("Mock description of image {}.", n)
                })
            })
            .collect();
        Ok(format!("```json\n{}\n```", json!(entries)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
