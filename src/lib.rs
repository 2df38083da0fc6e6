//! Generates images with a hosted text-to-image model, captions all of them in
//! one call to a multimodal model, and serves the pairs as JSON over HTTP.

pub mod captions;
pub mod config;
pub mod error;
pub mod generator;
pub mod handler;
pub mod logger;
pub mod models;
pub mod providers;
#[cfg(feature = "server")]
pub mod server;

pub use captions::{build_caption_instruction, parse_captions};
pub use config::{AppConfig, Backend, BedrockConfig, GenerationLimits, VertexConfig};
pub use error::{ImagenioError, Result};
pub use generator::{generate_images, BatchGuard};
pub use handler::{generate_captioned_images, resolve_request};
pub use models::*;
pub use providers::{CaptionProvider, ImageProvider, ModelClients};
