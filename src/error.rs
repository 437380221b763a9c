use thiserror::Error;

/// Crate-wide error type. Each variant is a distinguishable kind a caller
/// (or the HTTP gateway) can match on without parsing message text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("capacity must be non-negative, got {0}")]
    InvalidCapacity(i64),

    #[error("illegal key in change map: {0}")]
    IllegalKey(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage I/O failure: {0}")]
    StorageIo(#[source] anyhow::Error),

    #[error("failed to parse HTML template: {0}")]
    TemplateParse(#[source] anyhow::Error),

    #[error("failed to execute HTML template: {0}")]
    TemplateExecute(#[source] anyhow::Error),

    #[error("failed to encode QR code: {0}")]
    QrEncode(#[source] anyhow::Error),

    #[error("render service error: {0}")]
    RenderService(String),

    #[error("registry backend error: {0}")]
    RegistryBackend(#[source] anyhow::Error),

    #[error("no fields to update were provided")]
    NothingToUpdate,
}

pub type Result<T> = std::result::Result<T, Error>;
