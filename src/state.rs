//! Processing state threaded through the pipeline.
//!
//! A [`ProcessingState`] owns the ordered documents and the lookup indices
//! derived from them. The document index is always rebuilt from the document
//! list, so the only way to change it is to hand in a new list of documents.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// Field bag of a document. Insertion order is preserved.
pub type Fields = serde_json::Map<String, serde_json::Value>;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Where the document came from. Used to correlate the document across
    /// stages before and after it receives a remote id.
    #[serde(rename = "path", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub data: Fields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_language_id: Option<String>,
}

impl Document {
    pub fn from_source(source: Url) -> Self {
        Self {
            source: Some(source),
            ..Default::default()
        }
    }

    /// Index key of the document, if it has a stable one.
    pub fn key(&self) -> Option<String> {
        self.source.as_ref().map(Url::to_string)
    }

    /// Shallow merge: every field set in `patch` replaces the current one.
    pub fn merge(self, patch: DocumentPatch) -> Self {
        Self {
            source: patch.source.or(self.source),
            id: patch.id.or(self.id),
            kind: patch.kind.or(self.kind),
            lang: patch.lang.or(self.lang),
            uid: patch.uid.or(self.uid),
            title: patch.title.or(self.title),
            data: patch.data.unwrap_or(self.data),
            alternate_language_id: patch.alternate_language_id.or(self.alternate_language_id),
        }
    }
}

/// Partial result of a document transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentPatch {
    pub source: Option<Url>,
    pub id: Option<String>,
    pub kind: Option<String>,
    pub lang: Option<String>,
    pub uid: Option<String>,
    pub title: Option<String>,
    pub data: Option<Fields>,
    pub alternate_language_id: Option<String>,
}

impl From<Document> for DocumentPatch {
    fn from(document: Document) -> Self {
        Self {
            source: document.source,
            id: document.id,
            kind: document.kind,
            lang: document.lang,
            uid: document.uid,
            title: document.title,
            data: Some(document.data),
            alternate_language_id: document.alternate_language_id,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub url: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl Asset {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            id: None,
            alt: None,
        }
    }
}

pub type AssetIndex = IndexMap<String, Asset>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingState {
    documents: Vec<Document>,
    document_index: IndexMap<String, usize>,
    asset_index: AssetIndex,
}

impl ProcessingState {
    pub fn new(documents: Vec<Document>) -> Self {
        Self::default().with_documents(documents)
    }

    /// Replace the documents, rebuilding the document index. The asset index
    /// is carried over.
    pub fn with_documents(self, documents: Vec<Document>) -> Self {
        let document_index = index_documents(&documents);
        Self {
            documents,
            document_index,
            asset_index: self.asset_index,
        }
    }

    pub fn with_assets(self, asset_index: AssetIndex) -> Self {
        Self {
            asset_index,
            ..self
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, key: &str) -> Option<&Document> {
        self.document_index
            .get(key)
            .and_then(|position| self.documents.get(*position))
    }

    /// Identity keys with the position of their document.
    pub fn document_index(&self) -> &IndexMap<String, usize> {
        &self.document_index
    }

    pub fn assets(&self) -> &AssetIndex {
        &self.asset_index
    }

    pub fn into_parts(self) -> (Vec<Document>, AssetIndex) {
        (self.documents, self.asset_index)
    }
}

/// Documents without a source stay out of the index. On a duplicated key the
/// later document wins.
fn index_documents(documents: &[Document]) -> IndexMap<String, usize> {
    documents
        .iter()
        .enumerate()
        .filter_map(|(position, document)| document.key().map(|key| (key, position)))
        .collect()
}
