use crate::state::{Asset, Document};

pub mod asset;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod document;
pub mod pipeline;
pub mod resolver;
pub mod rich_text;
pub mod schema;
pub mod state;
pub mod warning;

#[cfg(test)]
mod tests;

pub use pipeline::{Pipeline, Stage};
pub use state::ProcessingState;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[error("{context}: {detail}")]
pub struct Error {
    pub context: Box<ErrorContext>,
    pub detail: Box<ErrorDetail>,
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub stage: &'static str,
    pub locator: Option<String>,
    pub id: Option<String>,
}

impl ErrorContext {
    pub(crate) fn new(stage: &'static str) -> Self {
        Self {
            stage,
            locator: None,
            id: None,
        }
    }

    pub(crate) fn document(stage: &'static str, document: &Document) -> Self {
        Self {
            stage,
            locator: document.key().or_else(|| document.uid.clone()),
            id: document.id.clone(),
        }
    }

    pub(crate) fn asset(stage: &'static str, asset: &Asset) -> Self {
        Self {
            stage,
            locator: Some(asset.url.to_string()),
            id: asset.id.clone(),
        }
    }

    pub(crate) fn error(&self, detail: ErrorDetail) -> Error {
        Error {
            context: Box::new(self.clone()),
            detail: Box::new(detail),
        }
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.stage)?;
        if let Some(locator) = &self.locator {
            write!(f, " {locator}")?;
        }
        if let Some(id) = &self.id {
            write!(f, "({id})")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorDetail {
    #[error("Failed to transform document: {0}")]
    Transform(anyhow::Error),
    #[error("Failed to find assets: {0}")]
    FindAssets(anyhow::Error),
    #[error("Failed to load asset: {0}")]
    LoadAsset(asset::loader::Error),
    #[error("Asset API rejected the upload: {0}")]
    AssetApi(BoxError),
    #[error("Migration API rejected the document: {0}")]
    MigrationApi(BoxError),
    #[error("Invalid glob pattern: {0}")]
    Pattern(glob::PatternError),
    #[error("Failed to walk documents: {0}")]
    Glob(glob::GlobError),
    #[error("Failed to resolve document path {path:?}: {error}")]
    DocumentPath {
        path: std::path::PathBuf,
        error: std::io::Error,
    },
    #[error("Checkpoint: {0}")]
    Checkpoint(checkpoint::Error),
}
