use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagenioError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("External service error: {0}")]
    ExternalServiceError(String),
    #[error("Caption parse error: {0}")]
    CaptionParseError(String),
    #[error("Alignment error: {images} images but {captions} captions")]
    AlignmentError { images: usize, captions: usize },
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ImagenioError {
    /// HTTP status a caller sees for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ImagenioError::ValidationError(_) => 406,
            ImagenioError::InvalidParameter(_) => 400,
            _ => 500,
        }
    }

    /// Body a caller sees for this error. Only validation failures carry their own text;
    /// everything else stays server-side.
    pub fn public_message(&self) -> String {
        match self {
            ImagenioError::ValidationError(msg) | ImagenioError::InvalidParameter(msg) => {
                msg.clone()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImagenioError>;
