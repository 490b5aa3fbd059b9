//! Kind dispatch for schema specific collaborators.
//!
//! Which fields of a document hold asset or document references depends on
//! its kind. A [`DocumentSchema`] describes one kind; a [`SchemaRegistry`]
//! picks the schema by the document's `type` and acts as both the
//! [`AssetMapper`] and the [`ReferenceMapper`] of the pipeline. Documents of
//! unregistered kinds pass through both untouched.

use std::sync::Arc;

use futures::future::ready;
use indexmap::IndexMap;

use crate::{
    asset::{AssetMapper, FoundAsset},
    resolver::{ReferenceMapper, Resolvers},
    state::{Document, Fields},
};

pub trait DocumentSchema: Send + Sync {
    /// The `type` tag this schema handles.
    fn kind(&self) -> &str;

    /// Assets referenced by a document of this kind.
    fn find_assets(&self, document: &Document) -> anyhow::Result<Vec<FoundAsset>>;

    /// Resolve the reference-bearing fields of a document of this kind.
    fn resolve_references(&self, data: Fields, resolvers: &Resolvers<'_>) -> Fields;
}

#[derive(Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, Arc<dyn DocumentSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `schema`, replacing any schema of the same kind.
    pub fn with(mut self, schema: impl DocumentSchema + 'static) -> Self {
        self.schemas.insert(schema.kind().to_owned(), Arc::new(schema));
        self
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn DocumentSchema>> {
        self.schemas.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    fn schema_for(&self, document: &Document) -> Option<&Arc<dyn DocumentSchema>> {
        document.kind.as_deref().and_then(|kind| self.get(kind))
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.kinds()).finish()
    }
}

impl AssetMapper for SchemaRegistry {
    fn find_assets(
        &self,
        document: Document,
    ) -> impl Future<Output = anyhow::Result<Vec<FoundAsset>>> + Send {
        ready(match self.schema_for(&document) {
            Some(schema) => schema.find_assets(&document),
            None => Ok(Vec::new()),
        })
    }
}

impl ReferenceMapper for SchemaRegistry {
    fn map_references(&self, document: Document, resolvers: &Resolvers<'_>) -> Document {
        match self.schema_for(&document) {
            Some(schema) => {
                let data = schema.resolve_references(document.data.clone(), resolvers);
                Document { data, ..document }
            }
            None => document,
        }
    }
}
