use crate::error::{ImagenioError, Result};
use std::env;
use std::str::FromStr;

pub const MAX_IMAGE_COUNT: u32 = 5;
pub const IMAGE_BATCH_LIMIT: u32 = 4;
pub const DEFAULT_PROJECT_ID: &str = "imagenio";
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
pub const DEFAULT_VERTEX_IMAGE_MODEL: &str = "imagegeneration@006";
pub const DEFAULT_VERTEX_CAPTION_MODEL: &str = "gemini-1.5-pro-preview-0409";
pub const DEFAULT_BEDROCK_IMAGE_MODEL: &str = "amazon.titan-image-generator-v1";
pub const DEFAULT_BEDROCK_CAPTION_MODEL: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

/// Which hosted models serve image generation and captioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Vertex,
    Bedrock,
    Mock,
}

impl FromStr for Backend {
    type Err = ImagenioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vertex" | "vertexai" | "google" => Ok(Backend::Vertex),
            "bedrock" | "aws" => Ok(Backend::Bedrock),
            "mock" => Ok(Backend::Mock),
            other => Err(ImagenioError::ConfigError(format!(
                "Unknown backend '{}', expected vertex, bedrock or mock",
                other
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Vertex => "vertex",
            Backend::Bedrock => "bedrock",
            Backend::Mock => "mock",
        }
    }
}

#[derive(Debug, Clone)]
pub struct VertexConfig {
    pub project_id: String,
    pub location: String,
    /// Fixed bearer token. When unset, tokens are fetched from the metadata server.
    pub access_token: Option<String>,
    pub metadata_host: String,
    pub image_model: String,
    pub caption_model: String,
}

impl Default for VertexConfig {
    fn default() -> Self {
        VertexConfig {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            location: DEFAULT_LOCATION.to_string(),
            access_token: None,
            metadata_host: DEFAULT_METADATA_HOST.to_string(),
            image_model: DEFAULT_VERTEX_IMAGE_MODEL.to_string(),
            caption_model: DEFAULT_VERTEX_CAPTION_MODEL.to_string(),
        }
    }
}

impl VertexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        VertexConfig {
            project_id: env::var("GOOGLE_CLOUD_PROJECT").unwrap_or(defaults.project_id),
            location: env::var("GOOGLE_CLOUD_LOCATION").unwrap_or(defaults.location),
            access_token: env::var("VERTEX_ACCESS_TOKEN").ok().filter(|t| !t.is_empty()),
            metadata_host: env::var("GCE_METADATA_HOST").unwrap_or(defaults.metadata_host),
            image_model: env::var("IMAGE_MODEL_ID").unwrap_or(defaults.image_model),
            caption_model: env::var("CAPTION_MODEL_ID").unwrap_or(defaults.caption_model),
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>, location: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self.location = location.into();
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_models(mut self, image_model: impl Into<String>, caption_model: impl Into<String>) -> Self {
        self.image_model = image_model.into();
        self.caption_model = caption_model.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct BedrockConfig {
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub image_model: String,
    pub caption_model: String,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        BedrockConfig {
            region: None,
            access_key: None,
            secret_key: None,
            image_model: DEFAULT_BEDROCK_IMAGE_MODEL.to_string(),
            caption_model: DEFAULT_BEDROCK_CAPTION_MODEL.to_string(),
        }
    }
}

impl BedrockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        BedrockConfig {
            region: env::var("AWS_REGION")
                .or_else(|_| env::var("AWS_DEFAULT_REGION"))
                .ok(),
            access_key: env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
            image_model: env::var("IMAGE_MODEL_ID").unwrap_or(defaults.image_model),
            caption_model: env::var("CAPTION_MODEL_ID").unwrap_or(defaults.caption_model),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }
}

/// Limits applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationLimits {
    /// Largest `image_count` a caller may ask for.
    pub max_image_count: u32,
    /// Most images the image provider accepts in one call.
    pub per_call_limit: u32,
    /// Consecutive zero-image calls tolerated before giving up.
    pub max_stalled_rounds: u32,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        GenerationLimits {
            max_image_count: MAX_IMAGE_COUNT,
            per_call_limit: IMAGE_BATCH_LIMIT,
            max_stalled_rounds: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub limits: GenerationLimits,
    pub vertex: VertexConfig,
    pub bedrock: BedrockConfig,
    pub json_logs: bool,
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            backend: Backend::Vertex,
            limits: GenerationLimits::default(),
            vertex: VertexConfig::default(),
            bedrock: BedrockConfig::default(),
            json_logs: false,
            log_level: None,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = match env::var("PORT") {
            Ok(port) => port
                .parse()
                .map_err(|_| ImagenioError::ConfigError(format!("Invalid PORT '{}'", port)))?,
            Err(_) => defaults.port,
        };
        let backend = match env::var("IMAGENIO_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.backend,
        };
        let limits = GenerationLimits {
            max_image_count: parse_env_u32("MAX_IMAGE_COUNT", defaults.limits.max_image_count)?,
            per_call_limit: parse_env_u32("IMAGE_BATCH_LIMIT", defaults.limits.per_call_limit)?,
            max_stalled_rounds: parse_env_u32(
                "MAX_STALLED_ROUNDS",
                defaults.limits.max_stalled_rounds,
            )?,
        };

        let config = AppConfig {
            host: env::var("HOST").unwrap_or(defaults.host),
            port,
            backend,
            limits,
            vertex: VertexConfig::from_env(),
            bedrock: BedrockConfig::from_env(),
            json_logs: env::var("LOG_FORMAT").map_or(false, |val| val == "json"),
            log_level: env::var("LOG_LEVEL").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.limits.per_call_limit == 0 {
            return Err(ImagenioError::ConfigError(
                "IMAGE_BATCH_LIMIT must be at least 1".into(),
            ));
        }
        if self.limits.max_image_count == 0 {
            return Err(ImagenioError::ConfigError(
                "MAX_IMAGE_COUNT must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_limits(mut self, limits: GenerationLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_vertex(mut self, config: VertexConfig) -> Self {
        self.vertex = config;
        self.backend = Backend::Vertex;
        self
    }

    pub fn with_bedrock(mut self, config: BedrockConfig) -> Self {
        self.bedrock = config;
        self.backend = Backend::Bedrock;
        self
    }
}

fn parse_env_u32(key: &str, default: u32) -> Result<u32> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ImagenioError::ConfigError(format!("Invalid {} '{}'", key, value))),
        Err(_) => Ok(default),
    }
}
