//! Bearer tokens for Vertex AI.
//!
//! A fixed token from the environment wins. Otherwise tokens come from the GCE
//! metadata server and are cached until shortly before they expire.

use crate::{
    config::VertexConfig,
    error::{ImagenioError, Result},
};
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + REFRESH_MARGIN < self.expires_at
    }
}

pub enum TokenSource {
    Static(String),
    Metadata {
        client: Client,
        url: String,
        cached: Mutex<Option<CachedToken>>,
    },
}

impl TokenSource {
    pub fn from_config(client: Client, config: &VertexConfig) -> Self {
        match &config.access_token {
            Some(token) => TokenSource::Static(token.clone()),
            None => TokenSource::Metadata {
                client,
                url: format!("http://{}{}", config.metadata_host, METADATA_TOKEN_PATH),
                cached: Mutex::new(None),
            },
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, TokenSource::Static(_))
    }

    pub async fn token(&self) -> Result<String> {
        let (client, url, cached) = match self {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata {
                client,
                url,
                cached,
            } => (client, url, cached),
        };

        let mut cached = cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Instant::now())) {
            return Ok(token.value.clone());
        }

        log::debug!("Refreshing Vertex AI access token from {}", url);
        let fetched = fetch_metadata_token(client, url).await?;
        let token = CachedToken {
            value: fetched.access_token,
            expires_at: Instant::now() + Duration::from_secs(fetched.expires_in),
        };
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}

async fn fetch_metadata_token(client: &Client, url: &str) -> Result<MetadataToken> {
    let response = client
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| {
            ImagenioError::ExternalServiceError(format!("Metadata token request failed: {}", e))
        })?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        log::error!("Metadata server returned {}: {}", status, error_text);
        return Err(ImagenioError::ExternalServiceError(format!(
            "Metadata server returned {}",
            status
        )));
    }

    response.json::<MetadataToken>().await.map_err(|e| {
        ImagenioError::ExternalServiceError(format!("Invalid metadata token response: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Nothing listens on the discard port, so any fetch fails fast.
    const UNREACHABLE: &str = "127.0.0.1:9";

    fn metadata_source(cached: Option<CachedToken>) -> TokenSource {
        TokenSource::Metadata {
            client: Client::new(),
            url: format!("http://{}{}", UNREACHABLE, METADATA_TOKEN_PATH),
            cached: Mutex::new(cached),
        }
    }

    #[test]
    fn test_override_token_is_static() {
        let config = VertexConfig::new().with_access_token("fixed");
        assert!(TokenSource::from_config(Client::new(), &config).is_static());

        let config = VertexConfig::new();
        assert!(!TokenSource::from_config(Client::new(), &config).is_static());
    }

    #[test]
    fn test_freshness_keeps_a_margin() {
        let now = Instant::now();
        let token = |secs| CachedToken {
            value: "t".into(),
            expires_at: now + Duration::from_secs(secs),
        };
        assert!(token(3599).is_fresh(now));
        assert!(!token(30).is_fresh(now));
    }

    #[tokio::test]
    async fn test_static_token() {
        let source = TokenSource::Static("fixed".into());
        assert_eq!(source.token().await.unwrap(), "fixed");
    }

    #[tokio::test]
    async fn test_fresh_cached_token_is_reused() {
        let source = metadata_source(Some(CachedToken {
            value: "cached".into(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        }));
        assert_eq!(source.token().await.unwrap(), "cached");
    }

    #[tokio::test]
    async fn test_expired_token_is_refetched() {
        let source = metadata_source(Some(CachedToken {
            value: "stale".into(),
            expires_at: Instant::now(),
        }));
        // The refetch goes to the metadata server instead of handing back the stale token.
        assert!(matches!(
            source.token().await,
            Err(ImagenioError::ExternalServiceError(_))
        ));
    }

    #[test]
    fn test_metadata_response_shape() {
        let token: MetadataToken = serde_json::from_str(
            r#"{"access_token":"ya29.abc","expires_in":3599,"token_type":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "ya29.abc");
        assert_eq!(token.expires_in, 3599);
    }
}
