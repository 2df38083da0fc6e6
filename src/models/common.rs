use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_PROMPT: &str = "a picture of a cute cat jumping";
pub const DEFAULT_DESCRIPTION_PROMPT: &str = "decribe the image";
pub const DEFAULT_IMAGE_COUNT: u32 = 1;

/// Resolved parameters of one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub image_prompt: String,
    pub description_prompt: String,
    pub image_count: u32,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            image_prompt: DEFAULT_IMAGE_PROMPT.to_string(),
            description_prompt: DEFAULT_DESCRIPTION_PROMPT.to_string(),
            image_count: DEFAULT_IMAGE_COUNT,
        }
    }
}

/// One element of the JSON array returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseItem {
    pub image: String, // Base64 encoded
    pub caption: String,
    pub title: String,
}
