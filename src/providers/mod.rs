pub mod bedrock;
pub mod gcp_token;
pub mod mock;
pub mod vertex;

use crate::{
    config::{AppConfig, Backend, GenerationLimits},
    error::Result,
    models::{CaptionOptions, GeneratedImage, ImageGenerationOptions},
};
use async_trait::async_trait;
use std::sync::Arc;

pub use bedrock::{BedrockCaptionClient, BedrockImageClient};
pub use gcp_token::TokenSource;
pub use mock::{MockCaptionProvider, MockImageProvider};
pub use vertex::{VertexCaptionClient, VertexImageClient};

/// Text-to-image model. May return fewer images than asked for when the
/// provider filters some out.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        count: u32,
        options: &ImageGenerationOptions,
    ) -> Result<Vec<GeneratedImage>>;

    fn name(&self) -> &str;
}

/// Multimodal model that answers one instruction about a set of images.
#[async_trait]
pub trait CaptionProvider: Send + Sync {
    async fn caption(
        &self,
        images: &[GeneratedImage],
        instruction: &str,
        options: &CaptionOptions,
    ) -> Result<String>;

    fn name(&self) -> &str;
}

/// Model handles and fixed generation settings, built once at startup and
/// shared read-only by every request.
#[derive(Clone)]
pub struct ModelClients {
    image: Arc<dyn ImageProvider>,
    caption: Arc<dyn CaptionProvider>,
    image_options: ImageGenerationOptions,
    caption_options: CaptionOptions,
    limits: GenerationLimits,
}

impl ModelClients {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let image: Arc<dyn ImageProvider>;
        let caption: Arc<dyn CaptionProvider>;
        match config.backend {
            Backend::Vertex => {
                let http = reqwest::Client::new();
                let tokens = Arc::new(TokenSource::from_config(http.clone(), &config.vertex));
                if tokens.is_static() {
                    log::info!("Using VERTEX_ACCESS_TOKEN for Vertex AI, it will not be refreshed");
                } else {
                    log::info!("Vertex AI tokens will be fetched from the metadata server");
                }
                image = Arc::new(VertexImageClient::new(
                    http.clone(),
                    tokens.clone(),
                    &config.vertex,
                ));
                caption = Arc::new(VertexCaptionClient::new(http, tokens, &config.vertex));
            }
            Backend::Bedrock => {
                let client = bedrock::build_client(&config.bedrock).await;
                image = Arc::new(BedrockImageClient::new(
                    client.clone(),
                    &config.bedrock.image_model,
                ));
                caption = Arc::new(BedrockCaptionClient::new(
                    client,
                    &config.bedrock.caption_model,
                ));
            }
            Backend::Mock => {
                log::warn!("Using mock model clients, no real images will be generated");
                image = Arc::new(MockImageProvider::new());
                caption = Arc::new(MockCaptionProvider::new());
            }
        }

        log::info!(
            "Model clients ready: images via {}, captions via {}",
            image.name(),
            caption.name()
        );

        Ok(Self::from_providers(image, caption, config.limits))
    }

    pub fn from_providers(
        image: Arc<dyn ImageProvider>,
        caption: Arc<dyn CaptionProvider>,
        limits: GenerationLimits,
    ) -> Self {
        Self {
            image,
            caption,
            image_options: ImageGenerationOptions::default(),
            caption_options: CaptionOptions::default(),
            limits,
        }
    }

    pub fn with_image_options(mut self, options: ImageGenerationOptions) -> Self {
        self.image_options = options;
        self
    }

    pub fn with_caption_options(mut self, options: CaptionOptions) -> Self {
        self.caption_options = options;
        self
    }

    pub fn image(&self) -> &dyn ImageProvider {
        self.image.as_ref()
    }

    pub fn caption(&self) -> &dyn CaptionProvider {
        self.caption.as_ref()
    }

    pub fn image_options(&self) -> &ImageGenerationOptions {
        &self.image_options
    }

    pub fn caption_options(&self) -> &CaptionOptions {
        &self.caption_options
    }

    pub fn limits(&self) -> GenerationLimits {
        self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_builds_without_credentials() {
        let config = AppConfig::new().with_backend(Backend::Mock);
        let clients = ModelClients::new(&config).await.unwrap();
        assert_eq!(clients.image().name(), "mock");
        assert_eq!(clients.caption().name(), "mock");
        assert_eq!(clients.limits().per_call_limit, 4);
        assert_eq!(clients.image_options().aspect_ratio, "1:1");
        assert_eq!(clients.caption_options().max_output_tokens, 8192);
    }

    #[tokio::test]
    async fn test_vertex_backend_builds_without_static_token() {
        let mut config = AppConfig::new().with_backend(Backend::Vertex);
        config.vertex.access_token = None;
        let clients = ModelClients::new(&config).await.unwrap();
        assert_eq!(clients.image().name(), "vertex");
        assert_eq!(clients.caption().name(), "vertex");
    }

    #[test]
    fn test_option_overrides() {
        let clients = ModelClients::from_providers(
            Arc::new(MockImageProvider::new()),
            Arc::new(MockCaptionProvider::new()),
            GenerationLimits::default(),
        )
        .with_image_options(ImageGenerationOptions {
            aspect_ratio: "16:9".into(),
            ..ImageGenerationOptions::default()
        })
        .with_caption_options(CaptionOptions {
            temperature: 0.2,
            ..CaptionOptions::default()
        });
        assert_eq!(clients.image_options().dimensions(), (1408, 768));
        assert_eq!(clients.caption_options().temperature, 0.2);
        assert_eq!(clients.caption_options().safety_settings.len(), 4);
    }
}
