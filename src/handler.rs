use crate::{
    captions::{build_caption_instruction, parse_captions},
    error::{ImagenioError, Result},
    generator::{generate_images, BatchGuard},
    models::{
        GenerationRequest, ResponseItem, DEFAULT_DESCRIPTION_PROMPT, DEFAULT_IMAGE_COUNT,
        DEFAULT_IMAGE_PROMPT,
    },
    providers::ModelClients,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Where request parameters were read from. A non-empty JSON object body wins
/// over the query string and supplies every field on its own.
enum ParamSource<'a> {
    Body(&'a Map<String, Value>),
    Query(&'a HashMap<String, String>),
}

impl ParamSource<'_> {
    fn text(&self, key: &str) -> Option<String> {
        match self {
            ParamSource::Body(map) => map.get(key).map(|value| match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            ParamSource::Query(query) => query.get(key).cloned(),
        }
    }

    fn integer(&self, key: &str) -> Option<std::result::Result<i64, String>> {
        match self {
            ParamSource::Body(map) => map.get(key).map(|value| match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                    .ok_or_else(|| n.to_string()),
                Value::String(s) => s.trim().parse().map_err(|_| s.clone()),
                other => Err(other.to_string()),
            }),
            ParamSource::Query(query) => query
                .get(key)
                .map(|s| s.trim().parse().map_err(|_| s.clone())),
        }
    }
}

/// Reads `image_prompt`, `desc_prompt` and `image_count`, applying defaults
/// and the image count bounds.
pub fn resolve_request(
    body: Option<&Value>,
    query: &HashMap<String, String>,
    max_image_count: u32,
) -> Result<GenerationRequest> {
    let source = match body {
        Some(Value::Object(map)) if !map.is_empty() => ParamSource::Body(map),
        _ => ParamSource::Query(query),
    };

    let image_count = match source.integer("image_count") {
        None => i64::from(DEFAULT_IMAGE_COUNT),
        Some(Ok(count)) => count,
        Some(Err(raw)) => {
            log::debug!("Rejecting non-integer image_count {:?}", raw);
            return Err(ImagenioError::InvalidParameter(
                "Invalid image_count. Expected an integer.".into(),
            ));
        }
    };

    if image_count > i64::from(max_image_count) {
        return Err(ImagenioError::ValidationError(format!(
            "Invalid image_count. Maximum image count is {}.",
            max_image_count
        )));
    }
    if image_count < 1 {
        return Err(ImagenioError::ValidationError(
            "Invalid image_count. Minimum image count is 1.".into(),
        ));
    }

    Ok(GenerationRequest {
        image_prompt: source
            .text("image_prompt")
            .unwrap_or_else(|| DEFAULT_IMAGE_PROMPT.to_string()),
        description_prompt: source
            .text("desc_prompt")
            .unwrap_or_else(|| DEFAULT_DESCRIPTION_PROMPT.to_string()),
        image_count: image_count as u32,
    })
}

/// Generates the images, captions them in one call and pairs the two up.
pub async fn generate_captioned_images(
    clients: &ModelClients,
    request: &GenerationRequest,
) -> Result<Vec<ResponseItem>> {
    let limits = clients.limits();
    let guard = BatchGuard::for_request(
        request.image_count,
        limits.per_call_limit,
        limits.max_stalled_rounds,
    );

    let images = generate_images(
        clients.image(),
        &request.image_prompt,
        request.image_count,
        limits.per_call_limit,
        clients.image_options(),
        guard,
    )
    .await?;

    let instruction = build_caption_instruction(&request.description_prompt);
    let raw_captions = clients
        .caption()
        .caption(&images, &instruction, clients.caption_options())
        .await?;
    let captions = parse_captions(&raw_captions)?;

    if captions.len() != images.len() {
        return Err(ImagenioError::AlignmentError {
            images: images.len(),
            captions: captions.len(),
        });
    }

    Ok(images
        .iter()
        .zip(captions)
        .map(|(image, caption)| ResponseItem {
            image: STANDARD.encode(&image.bytes),
            caption: caption.description,
            title: caption.title,
        })
        .collect())
}
