use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE_MIME_TYPE: &str = "image/png";

/// Raw image bytes produced by an image provider. Only its position in the
/// generated sequence identifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: DEFAULT_IMAGE_MIME_TYPE.to_string(),
        }
    }
}

/// Options sent with every image generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGenerationOptions {
    pub language: String,
    pub aspect_ratio: String,
    pub safety_filter_level: String,
    pub person_generation: String,
}

impl Default for ImageGenerationOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            aspect_ratio: "1:1".to_string(),
            safety_filter_level: "block_some".to_string(),
            person_generation: "allow_adult".to_string(),
        }
    }
}

impl ImageGenerationOptions {
    /// Pixel size for an aspect ratio, for backends that take explicit dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        match self.aspect_ratio.as_str() {
            "9:16" => (768, 1408),
            "16:9" => (1408, 768),
            "3:4" => (896, 1152),
            "4:3" => (1152, 896),
            _ => (1024, 1024),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct TitanImageResponse {
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagenPrediction {
    pub bytes_base64_encoded: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImagenPredictResponse {
    #[serde(default)]
    pub predictions: Vec<ImagenPrediction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = ImageGenerationOptions::default();
        assert_eq!(options.language, "en");
        assert_eq!(options.aspect_ratio, "1:1");
        assert_eq!(options.safety_filter_level, "block_some");
        assert_eq!(options.person_generation, "allow_adult");
        assert_eq!(options.dimensions(), (1024, 1024));
    }

    #[test]
    fn test_imagen_response_tolerates_filtered_predictions() {
        let body = r#"{"predictions":[{"bytesBase64Encoded":"aGk=","mimeType":"image/png"},{"raiFilteredReason":"blocked"}]}"#;
        let parsed: ImagenPredictResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.predictions.len(), 2);
        assert!(parsed.predictions[1].bytes_base64_encoded.is_none());

        let empty: ImagenPredictResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.predictions.is_empty());
    }
}
