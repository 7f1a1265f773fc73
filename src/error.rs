//! Error types shared by backends, collectors, registries and the hosting panel.
//!
//! The split mirrors how failures are handled by the orchestrator:
//!
//! | Kind | Variant | Handling |
//! |------|---------|----------|
//! | Transport | [`BackendError::Transport`], [`CollectError::Transport`] | propagated, never retried |
//! | Authentication | [`BackendError::LoginFailed`] | fatal for that site's run |
//! | Not found | [`BackendError::NotFound`], [`CollectError::NotFound`] | drives create-then-reconfirm |
//! | Contract | [`BackendError::MissingId`] | rejected before any request is made |
//!
//! Policy rejections (keyword filter, already-published titles) are not errors
//! at all; they are logged by the reconciler and reported as skips.

use thiserror::Error;

/// Failure of a backend capability call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network, timeout or body decoding failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The login form did not answer with a redirect.
    #[error("login failed with status {status}")]
    LoginFailed { status: u16 },

    /// Lookup by natural key found nothing.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The backend answered, but not with the status or marker that means success.
    #[error("{operation} rejected by backend (status {status})")]
    Rejected { operation: &'static str, status: u16 },

    /// Delete called without an identifier.
    #[error("{entity} id is required")]
    MissingId { entity: &'static str },

    /// The page that should carry a value (token, listing row) did not.
    #[error("unexpected page content: {0}")]
    Parse(String),
}

impl BackendError {
    /// `true` for the not-found sentinel, which callers treat as "create it".
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }
}

/// Failure of an external collector.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("article not found: {0}")]
    NotFound(String),

    #[error("unexpected page content: {0}")]
    Parse(String),
}

/// Lookup of a name nobody registered.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no {kind} registered under `{name}`")]
    Unregistered { kind: &'static str, name: String },
}

/// Failure of the hosting panel handle.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("hosting panel session unavailable: {0}")]
    Unavailable(String),

    #[error("hosting panel did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to load the sites file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid sites file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
