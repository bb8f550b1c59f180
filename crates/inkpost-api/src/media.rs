use std::path::{Path, PathBuf};

use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const PROFILE_PICTURE_DIR: &str = "profile_pictures";

/// Manages uploaded media on disk. Stored files are referenced by their path
/// relative to the media root and served under `/media/`.
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(root.join(PROFILE_PICTURE_DIR)).await?;
        info!("Media directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Public URL for a stored relative path.
    pub fn url(&self, relative: &str) -> String {
        format!("/media/{}", relative)
    }

    /// Writes an already validated image and returns its relative path,
    /// named after the upload time. A numeric suffix keeps uploads within the
    /// same second apart.
    pub async fn save_profile_picture(&self, bytes: &[u8]) -> Result<String> {
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("profile_picture_{}.png", stamp)
            } else {
                format!("profile_picture_{}_{}.png", stamp, attempt)
            };
            let relative = format!("{}/{}", PROFILE_PICTURE_DIR, name);

            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.root.join(&relative))
                .await;
            match opened {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    debug!("Stored profile picture {} ({} bytes)", relative, bytes.len());
                    return Ok(relative);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Deletes a stored file. Failures are logged, not returned.
    pub async fn remove(&self, relative: &str) {
        if let Err(e) = fs::remove_file(self.root.join(relative)).await {
            warn!("Failed to remove {}: {}", relative, e);
        }
    }
}

/// Decodes a base64 image, optionally wrapped as a `data:image/...;base64,`
/// URL, and checks that it is an image the decoder understands.
pub fn decode_image(data: &str) -> Option<Vec<u8>> {
    let payload = if data.starts_with("data:image") {
        data.rsplit("base64,").next().unwrap_or(data)
    } else {
        data
    };

    let bytes = STANDARD.decode(payload.trim()).ok()?;
    image::load_from_memory(&bytes).ok()?;
    Some(bytes)
}
