use crate::{
    error::{ImagenioError, Result},
    models::{GeneratedImage, ImageGenerationOptions},
    providers::ImageProvider,
};

/// Extra calls allowed on top of the ideal `ceil(total / limit)` before the
/// loop gives up.
const EXTRA_ROUNDS: u32 = 4;

/// Bounds on how long the batch loop keeps asking a provider that under-delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchGuard {
    pub max_stalled_rounds: u32,
    pub max_rounds: u32,
}

impl BatchGuard {
    pub fn for_request(total_count: u32, per_call_limit: u32, max_stalled_rounds: u32) -> Self {
        Self {
            max_stalled_rounds: max_stalled_rounds.max(1),
            max_rounds: total_count.div_ceil(per_call_limit.max(1)) + EXTRA_ROUNDS,
        }
    }
}

/// Collects `total_count` images from `provider`, asking for at most
/// `per_call_limit` per call.
///
/// Progress is measured by what actually came back, so a provider that filters
/// images out is simply asked again for the remainder.
pub async fn generate_images(
    provider: &dyn ImageProvider,
    prompt: &str,
    total_count: u32,
    per_call_limit: u32,
    options: &ImageGenerationOptions,
    guard: BatchGuard,
) -> Result<Vec<GeneratedImage>> {
    if prompt.trim().is_empty() {
        return Err(ImagenioError::ValidationError(
            "Invalid image_prompt. Prompt must not be empty.".into(),
        ));
    }
    if total_count == 0 || per_call_limit == 0 {
        return Err(ImagenioError::ValidationError(format!(
            "Invalid image counts: total {} with per-call limit {}",
            total_count, per_call_limit
        )));
    }

    let mut images: Vec<GeneratedImage> = Vec::with_capacity(total_count as usize);
    let mut current = 0u32;
    let mut rounds = 0u32;
    let mut stalled = 0u32;

    while current < total_count {
        if rounds >= guard.max_rounds {
            log::error!(
                "Giving up after {} image calls with {}/{} images",
                rounds,
                current,
                total_count
            );
            return Err(ImagenioError::ExternalServiceError(
                "image provider made no progress".into(),
            ));
        }

        let remaining = total_count - current;
        let batch_size = per_call_limit.min(remaining);
        let mut batch = provider.generate(prompt, batch_size, options).await?;
        rounds += 1;

        if batch.len() > batch_size as usize {
            log::warn!(
                "Provider returned {} images for a batch of {}, keeping {}",
                batch.len(),
                batch_size,
                batch_size
            );
            batch.truncate(batch_size as usize);
        }

        if batch.is_empty() {
            stalled += 1;
            log::warn!(
                "Image call {} returned no images ({} stalled in a row)",
                rounds,
                stalled
            );
            if stalled >= guard.max_stalled_rounds {
                return Err(ImagenioError::ExternalServiceError(
                    "image provider made no progress".into(),
                ));
            }
        } else {
            stalled = 0;
        }

        images.extend(batch);
        current = images.len() as u32;
        log::info!("Images generated so far: {}", current);
    }

    Ok(images)
}
