use crate::{
    config::VertexConfig,
    error::{ImagenioError, Result},
    models::{
        CaptionOptions, Content, GenerateContentRequest, GenerateContentResponse,
        GeneratedImage, GenerationConfig, ImageGenerationOptions, ImagenPredictResponse,
        InlineData, Part, DEFAULT_IMAGE_MIME_TYPE,
    },
    providers::{gcp_token::TokenSource, CaptionProvider, ImageProvider},
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared plumbing for calling a publisher model on Vertex AI.
#[derive(Clone)]
struct VertexEndpoint {
    client: Client,
    tokens: Arc<TokenSource>,
    base_url: String,
    model: String,
}

impl VertexEndpoint {
    fn new(client: Client, tokens: Arc<TokenSource>, config: &VertexConfig, model: &str) -> Self {
        let base_url = format!(
            "https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/publishers/google/models",
            location = config.location,
            project = config.project_id,
        );

        Self {
            client,
            tokens,
            base_url,
            model: model.to_string(),
        }
    }

    fn url(&self, verb: &str) -> String {
        format!("{}/{}:{}", self.base_url, self.model, verb)
    }

    async fn post<T: DeserializeOwned>(&self, verb: &str, payload: &Value) -> Result<T> {
        let url = self.url(verb);
        log::debug!("POST {}", url);

        let access_token = self.tokens.token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                ImagenioError::ExternalServiceError(format!("Vertex AI request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("Vertex AI {} returned {}: {}", self.model, status, error_text);
            return Err(ImagenioError::ExternalServiceError(format!(
                "Vertex AI {} returned {}",
                self.model, status
            )));
        }

        response.json::<T>().await.map_err(|e| {
            ImagenioError::ExternalServiceError(format!("Invalid Vertex AI response: {}", e))
        })
    }
}

/// Imagen via the `:predict` endpoint.
#[derive(Clone)]
pub struct VertexImageClient {
    endpoint: VertexEndpoint,
}

impl VertexImageClient {
    pub fn new(client: Client, tokens: Arc<TokenSource>, config: &VertexConfig) -> Self {
        Self {
            endpoint: VertexEndpoint::new(client, tokens, config, &config.image_model),
        }
    }

    pub fn endpoint_url(&self) -> String {
        self.endpoint.url("predict")
    }
}

pub(crate) fn imagen_payload(prompt: &str, count: u32, options: &ImageGenerationOptions) -> Value {
    json!({
        "instances": [{ "prompt": prompt }],
        "parameters": {
            "sampleCount": count,
            "language": options.language,
            "aspectRatio": options.aspect_ratio,
            "safetySetting": options.safety_filter_level,
            "personGeneration": options.person_generation
        }
    })
}

pub(crate) fn decode_predictions(response: ImagenPredictResponse) -> Result<Vec<GeneratedImage>> {
    let mut images = Vec::with_capacity(response.predictions.len());
    for prediction in response.predictions {
        // Filtered predictions carry a reason instead of bytes.
        let Some(encoded) = prediction.bytes_base64_encoded else {
            continue;
        };
        let bytes = STANDARD.decode(encoded).map_err(|e| {
            ImagenioError::ExternalServiceError(format!("Invalid image payload: {}", e))
        })?;
        images.push(GeneratedImage {
            bytes,
            mime_type: prediction
                .mime_type
                .unwrap_or_else(|| DEFAULT_IMAGE_MIME_TYPE.to_string()),
        });
    }
    Ok(images)
}

#[async_trait]
impl ImageProvider for VertexImageClient {
    async fn generate(
        &self,
        prompt: &str,
        count: u32,
        options: &ImageGenerationOptions,
    ) -> Result<Vec<GeneratedImage>> {
        log::info!("Generating {} image(s) with model: {}", count, self.endpoint.model);

        let payload = imagen_payload(prompt, count, options);
        let response: ImagenPredictResponse = self.endpoint.post("predict", &payload).await?;
        decode_predictions(response)
    }

    fn name(&self) -> &str {
        "vertex"
    }
}

/// Gemini via the `:generateContent` endpoint.
#[derive(Clone)]
pub struct VertexCaptionClient {
    endpoint: VertexEndpoint,
}

impl VertexCaptionClient {
    pub fn new(client: Client, tokens: Arc<TokenSource>, config: &VertexConfig) -> Self {
        Self {
            endpoint: VertexEndpoint::new(client, tokens, config, &config.caption_model),
        }
    }

    pub fn endpoint_url(&self) -> String {
        self.endpoint.url("generateContent")
    }
}

pub(crate) fn caption_request(
    images: &[GeneratedImage],
    instruction: &str,
    options: &CaptionOptions,
) -> GenerateContentRequest {
    let mut parts: Vec<Part> = images
        .iter()
        .map(|image| Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.clone(),
                data: STANDARD.encode(&image.bytes),
            },
        })
        .collect();
    parts.push(Part::Text {
        text: instruction.to_string(),
    });

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: GenerationConfig {
            max_output_tokens: options.max_output_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
        },
        safety_settings: options.safety_settings.clone(),
    }
}

#[async_trait]
impl CaptionProvider for VertexCaptionClient {
    async fn caption(
        &self,
        images: &[GeneratedImage],
        instruction: &str,
        options: &CaptionOptions,
    ) -> Result<String> {
        log::info!(
            "Captioning {} image(s) with model: {}",
            images.len(),
            self.endpoint.model
        );

        let request = caption_request(images, instruction, options);
        let payload = serde_json::to_value(&request)
            .map_err(|e| ImagenioError::SerializationError(e.to_string()))?;

        let response: GenerateContentResponse =
            self.endpoint.post("generateContent", &payload).await?;

        if let Some(reason) = response
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
        {
            log::debug!("Caption finish reason: {}", reason);
        }

        response.text().ok_or_else(|| {
            ImagenioError::ExternalServiceError("Caption model returned no text".into())
        })
    }

    fn name(&self) -> &str {
        "vertex"
    }
}
