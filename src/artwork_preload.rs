//! Download-and-decode check for selected artwork URLs.

use std::io::Read;
use std::time::Duration;

use crate::protocol::ImageReference;

const MAX_ARTWORK_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImagePreloadError {
    #[error("artwork failed to load: {0}")]
    LoadFailed(String),
    #[error("artwork load timed out")]
    Timeout,
}

/// Blocking preload boundary; `Ok` means the image is displayable.
pub trait ArtworkPreloader: Send + Sync {
    fn preload(&self, image: &ImageReference) -> Result<(), ImagePreloadError>;
}

/// Confirms `bytes` decode as a raster image.
pub fn verify_image_bytes(bytes: &[u8]) -> Result<(), ImagePreloadError> {
    if bytes.is_empty() {
        return Err(ImagePreloadError::LoadFailed("empty body".to_string()));
    }
    image::load_from_memory(bytes)
        .map(|_| ())
        .map_err(|error| ImagePreloadError::LoadFailed(format!("undecodable image: {error}")))
}

fn is_timeout_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    lowered.contains("timed out") || lowered.contains("timeout")
}

pub struct HttpArtworkPreloader {
    http_client: ureq::Agent,
    user_agent: String,
}

impl HttpArtworkPreloader {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self {
            http_client,
            user_agent: user_agent.into(),
        }
    }
}

impl ArtworkPreloader for HttpArtworkPreloader {
    fn preload(&self, image: &ImageReference) -> Result<(), ImagePreloadError> {
        if !image.is_remote() {
            return Ok(());
        }
        let response = self
            .http_client
            .get(image.as_str())
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|error| match error {
                ureq::Error::Transport(transport) if is_timeout_message(&transport.to_string()) => {
                    ImagePreloadError::Timeout
                }
                other => ImagePreloadError::LoadFailed(other.to_string()),
            })?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_ARTWORK_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|error| {
                if error.kind() == std::io::ErrorKind::TimedOut
                    || is_timeout_message(&error.to_string())
                {
                    ImagePreloadError::Timeout
                } else {
                    ImagePreloadError::LoadFailed(format!("Failed to read artwork: {error}"))
                }
            })?;
        verify_image_bytes(&bytes)
    }
}
