//! Remote write APIs.
//!
//! The pipeline only talks to the [`MigrationApi`] and [`AssetApi`] traits.
//! [`http`] implements them over the real services, [`local`] keeps
//! everything in memory for dry runs and tests.

use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use url::Url;

use crate::state::{Document, Fields};

pub mod http;
pub mod local;
pub mod throttle;

pub use throttle::{RequestPolicy, RetryPolicy, Throttle};

/// Connection settings of one remote API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub repository: String,
    pub token: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Body of a create or update request.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DocumentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_language_id: Option<String>,
    pub data: Fields,
}

impl DocumentPayload {
    /// Only the properties the migration API accepts. `data` is sent empty
    /// unless `include_fields` is set.
    pub fn from_document(document: &Document, include_fields: bool) -> Self {
        Self {
            title: document.title.clone(),
            kind: document.kind.clone(),
            lang: document.lang.clone(),
            uid: document.uid.clone(),
            alternate_language_id: document.alternate_language_id.clone(),
            data: if include_fields {
                document.data.clone()
            } else {
                Fields::new()
            },
        }
    }
}

#[derive(derive_debug::Dbg, Clone)]
pub struct AssetUpload {
    pub filename: String,
    pub content_type: String,
    #[dbg(skip)]
    pub body: Bytes,
    pub alt: Option<String>,
}

pub trait MigrationApi {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create a document, returning its new id.
    fn create(
        &self,
        payload: &DocumentPayload,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;

    /// Update the document `id`, returning the id the server reports.
    fn update(
        &self,
        id: &str,
        payload: &DocumentPayload,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

pub trait AssetApi {
    type Error: std::error::Error + Send + Sync + 'static;

    fn upload(
        &self,
        upload: AssetUpload,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}
