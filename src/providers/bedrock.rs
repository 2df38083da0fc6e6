use crate::{
    config::BedrockConfig,
    error::{ImagenioError, Result},
    models::{
        CaptionOptions, ClaudeResponse, GeneratedImage, ImageGenerationOptions,
        TitanImageResponse,
    },
    providers::{CaptionProvider, ImageProvider},
};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::{error::ProvideErrorMetadata, primitives::Blob, Client};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

pub async fn build_client(bedrock_config: &BedrockConfig) -> Client {
    let mut loader = aws_config::from_env();

    if let Some(region) = &bedrock_config.region {
        loader = loader.region(aws_sdk_bedrockruntime::config::Region::new(region.clone()));
    }

    if let (Some(access_key), Some(secret_key)) =
        (&bedrock_config.access_key, &bedrock_config.secret_key)
    {
        loader = loader.credentials_provider(aws_sdk_bedrockruntime::config::Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "imagenio",
        ));
        if bedrock_config.region.is_none() {
            loader = loader.region(aws_sdk_bedrockruntime::config::Region::new("us-east-1"));
        }
    }

    let aws_config = loader.load().await;
    Client::new(&aws_config)
}

async fn invoke(client: &Client, model_id: &str, payload: &Value) -> Result<Vec<u8>> {
    let request_json = serde_json::to_string(payload)
        .map_err(|e| ImagenioError::SerializationError(e.to_string()))?;

    let response = client
        .invoke_model()
        .model_id(model_id)
        .content_type("application/json")
        .accept("application/json")
        .body(Blob::new(request_json.into_bytes()))
        .send()
        .await
        .map_err(|e| {
            log::error!("Bedrock invoke_model error details: {:?}", e);

            if let Some(service_error) = e.as_service_error() {
                ImagenioError::ExternalServiceError(format!(
                    "Bedrock service error: {} - {}",
                    service_error.code().unwrap_or("unknown"),
                    service_error.message().unwrap_or("no message")
                ))
            } else {
                ImagenioError::ExternalServiceError(format!("AWS SDK error: {}", e))
            }
        })?;

    Ok(response.body.into_inner())
}

#[derive(Clone)]
pub struct BedrockImageClient {
    client: Client,
    model_id: String,
}

impl BedrockImageClient {
    pub fn new(client: Client, model_id: &str) -> Self {
        Self {
            client,
            model_id: model_id.to_string(),
        }
    }
}

/// Titan takes explicit dimensions and has no language, safety level or
/// person-generation knobs.
pub(crate) fn titan_payload(prompt: &str, count: u32, options: &ImageGenerationOptions) -> Value {
    let (width, height) = options.dimensions();
    json!({
        "taskType": "TEXT_IMAGE",
        "textToImageParams": {
            "text": prompt
        },
        "imageGenerationConfig": {
            "numberOfImages": count,
            "width": width,
            "height": height,
            "quality": "standard",
            "cfgScale": 8.0
        }
    })
}

#[async_trait]
impl ImageProvider for BedrockImageClient {
    async fn generate(
        &self,
        prompt: &str,
        count: u32,
        options: &ImageGenerationOptions,
    ) -> Result<Vec<GeneratedImage>> {
        log::info!("Generating {} image(s) with model: {}", count, self.model_id);
        log::debug!(
            "Ignoring options without a Titan equivalent: language={}, safety={}, person_generation={}",
            options.language,
            options.safety_filter_level,
            options.person_generation
        );

        let payload = titan_payload(prompt, count, options);
        let response_bytes = invoke(&self.client, &self.model_id, &payload).await?;

        let titan_response: TitanImageResponse = serde_json::from_slice(&response_bytes)
            .map_err(|e| ImagenioError::ExternalServiceError(e.to_string()))?;

        titan_response
            .images
            .iter()
            .map(|encoded| {
                STANDARD
                    .decode(encoded)
                    .map(GeneratedImage::png)
                    .map_err(|e| {
                        ImagenioError::ExternalServiceError(format!("Invalid image payload: {}", e))
                    })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "bedrock"
    }
}

#[derive(Clone)]
pub struct BedrockCaptionClient {
    client: Client,
    model_id: String,
}

impl BedrockCaptionClient {
    pub fn new(client: Client, model_id: &str) -> Self {
        Self {
            client,
            model_id: model_id.to_string(),
        }
    }
}

pub(crate) fn claude_payload(
    images: &[GeneratedImage],
    instruction: &str,
    options: &CaptionOptions,
) -> Value {
    let mut content: Vec<Value> = images
        .iter()
        .map(|image| {
            json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.mime_type,
                    "data": STANDARD.encode(&image.bytes)
                }
            })
        })
        .collect();
    content.push(json!({ "type": "text", "text": instruction }));

    json!({
        "anthropic_version": "bedrock-2023-05-31",
        "max_tokens": options.max_output_tokens,
        "temperature": options.temperature,
        "top_p": options.top_p,
        "messages": [
            {
                "role": "user",
                "content": content
            }
        ]
    })
}

#[async_trait]
impl CaptionProvider for BedrockCaptionClient {
    async fn caption(
        &self,
        images: &[GeneratedImage],
        instruction: &str,
        options: &CaptionOptions,
    ) -> Result<String> {
        log::info!("Captioning {} image(s) with model: {}", images.len(), self.model_id);
        if !options.safety_settings.is_empty() {
            log::debug!("Bedrock has no per-request harm thresholds, using model defaults");
        }

        let payload = claude_payload(images, instruction, options);
        let response_bytes = invoke(&self.client, &self.model_id, &payload).await?;

        let claude_response: ClaudeResponse = serde_json::from_slice(&response_bytes)
            .map_err(|e| ImagenioError::ExternalServiceError(e.to_string()))?;

        let text: String = claude_response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if text.is_empty() {
            return Err(ImagenioError::ExternalServiceError(format!(
                "Caption model returned no text (stop reason: {})",
                claude_response.stop_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "bedrock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_configured_region_applies_without_credentials() {
        let config = BedrockConfig::new().with_region("eu-west-1");
        let client = build_client(&config).await;
        assert_eq!(
            client.config().region().map(|r| r.as_ref()),
            Some("eu-west-1")
        );
    }

    #[tokio::test]
    async fn test_explicit_credentials_default_to_us_east_1() {
        let config = BedrockConfig::new().with_credentials("AKIDEXAMPLE", "secret");
        let client = build_client(&config).await;
        assert_eq!(
            client.config().region().map(|r| r.as_ref()),
            Some("us-east-1")
        );
    }

    #[test]
    fn test_titan_payload() {
        let payload = titan_payload("a red balloon", 4, &ImageGenerationOptions::default());
        assert_eq!(payload["taskType"], "TEXT_IMAGE");
        assert_eq!(payload["textToImageParams"]["text"], "a red balloon");
        assert_eq!(payload["imageGenerationConfig"]["numberOfImages"], 4);
        assert_eq!(payload["imageGenerationConfig"]["width"], 1024);
        assert_eq!(payload["imageGenerationConfig"]["height"], 1024);
    }

    #[test]
    fn test_claude_payload_orders_images_then_text() {
        let images = vec![GeneratedImage::png(b"img".to_vec())];
        let payload = claude_payload(&images, "describe", &CaptionOptions::default());
        let content = payload["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["media_type"], "image/png");
        assert_eq!(content[0]["source"]["data"], STANDARD.encode(b"img"));
        assert_eq!(content[1]["text"], "describe");
        assert_eq!(payload["max_tokens"], 8192);
    }
}
