//! JSON checkpoints of a [`ProcessingState`].
//!
//! Documents are stored once; the document index is stored as
//! `[key, position]` pairs and the asset index as `[key, asset]` pairs.
//! On read the document index is derived from the documents again, the
//! stored pairs are only checked.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    ErrorContext, ErrorDetail, ProcessingState, Stage,
    state::{Asset, Document},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path:?}: {error}")]
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("failed to write {path:?}: {error}")]
    Write {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("failed to encode state: {0}")]
    Encode(serde_json::Error),
    #[error("failed to decode {path:?}: {error}")]
    Decode {
        path: PathBuf,
        error: serde_json::Error,
    },
    #[error("index entry {key} points at document {position}, but there are {len} documents")]
    DanglingIndex {
        key: String,
        position: usize,
        len: usize,
    },
}

#[derive(Serialize)]
struct CheckpointRef<'s> {
    documents: &'s [Document],
    document_index: Vec<(&'s str, usize)>,
    asset_index: Vec<(&'s str, &'s Asset)>,
}

#[derive(Deserialize)]
struct Checkpoint {
    #[serde(default)]
    documents: Vec<Document>,
    #[serde(default)]
    document_index: Vec<(String, usize)>,
    #[serde(default)]
    asset_index: Vec<(String, Asset)>,
}

pub async fn write(path: &Path, state: &ProcessingState) -> Result<(), Error> {
    let checkpoint = CheckpointRef {
        documents: state.documents(),
        document_index: state
            .document_index()
            .iter()
            .map(|(key, position)| (key.as_str(), *position))
            .collect(),
        asset_index: state
            .assets()
            .iter()
            .map(|(key, asset)| (key.as_str(), asset))
            .collect(),
    };
    let json = serde_json::to_string_pretty(&checkpoint).map_err(Error::Encode)?;
    if let Some(parent) = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent).await.map_err(|error| Error::Write {
            path: parent.to_owned(),
            error,
        })?;
    }
    tokio::fs::write(path, json).await.map_err(|error| Error::Write {
        path: path.to_owned(),
        error,
    })
}

pub async fn read(path: &Path) -> Result<ProcessingState, Error> {
    let json = tokio::fs::read_to_string(path).await.map_err(|error| Error::Read {
        path: path.to_owned(),
        error,
    })?;
    let checkpoint: Checkpoint = serde_json::from_str(&json).map_err(|error| Error::Decode {
        path: path.to_owned(),
        error,
    })?;
    let len = checkpoint.documents.len();
    if let Some((key, position)) = checkpoint
        .document_index
        .iter()
        .find(|(_, position)| *position >= len)
    {
        return Err(Error::DanglingIndex {
            key: key.clone(),
            position: *position,
            len,
        });
    }
    let state = ProcessingState::new(checkpoint.documents)
        .with_assets(checkpoint.asset_index.into_iter().collect());
    for (key, position) in &checkpoint.document_index {
        if state.document_index().get(key) != Some(position) {
            warn!(
                key = key.as_str(),
                position = *position,
                "stored index entry does not match its document"
            );
        }
    }
    info!(
        path = %path.display(),
        documents = state.documents().len(),
        assets = state.assets().len(),
        "checkpoint loaded"
    );
    Ok(state)
}

/// Write the state to `path` and pass it on unchanged.
pub fn dump(path: impl Into<PathBuf>) -> Stage {
    let path: PathBuf = path.into();
    Stage::new("dump", move |state: ProcessingState| {
        let path = path.clone();
        async move {
            write(&path, &state).await.map_err(|error| {
                ErrorContext {
                    locator: Some(path.display().to_string()),
                    ..ErrorContext::new("dump")
                }
                .error(ErrorDetail::Checkpoint(error))
            })?;
            info!(path = %path.display(), "checkpoint written");
            Ok(state)
        }
    })
}
