//! Hosting panel handle.
//!
//! Sites live on servers managed by a hosting panel. Before the backend login
//! the orchestrator makes sure the panel session is up, and after an article
//! is published it pushes the article's downloaded images into the site root
//! through the panel.
//!
//! [`FilesystemPanel`] is the handle for sites whose root directory is
//! reachable from this machine.

use crate::collectors::LocalImage;
use crate::error::PanelError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, instrument};

/// How long the orchestrator waits for [`HostingPanel::ensure_session`].
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(8);

#[async_trait]
pub trait HostingPanel: Send + Sync {
    /// Make sure a live panel session exists, logging in if needed.
    async fn ensure_session(&self) -> Result<(), PanelError>;

    /// Copy a downloaded image into the site root.
    async fn upload_image(&self, site_root: &Path, image: &LocalImage) -> Result<(), PanelError>;
}

/// A panel whose sites are plain directories on the local file system.
#[derive(Debug, Clone, Default)]
pub struct FilesystemPanel {
    root: PathBuf,
}

impl FilesystemPanel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// `remote` as a path strictly inside `root`.
fn target_path(root: &Path, remote: &str) -> Result<PathBuf, PanelError> {
    let relative = Path::new(remote.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(PanelError::Unavailable(format!("refusing image path `{remote}`")));
    }
    Ok(root.join(relative))
}

#[async_trait]
impl HostingPanel for FilesystemPanel {
    async fn ensure_session(&self) -> Result<(), PanelError> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(PanelError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(image = %image.remote_path))]
    async fn upload_image(&self, site_root: &Path, image: &LocalImage) -> Result<(), PanelError> {
        let target = target_path(site_root, &image.remote_path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = fs::copy(&image.local_path, &target).await?;
        debug!(bytes, target = %target.display(), "Image uploaded");
        Ok(())
    }
}
