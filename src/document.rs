//! Document discovery, mapping and synchronization with the migration
//! release.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::future::{ready, try_join_all};
use tracing::{debug, info};
use url::Url;

use crate::{
    Error, ErrorContext, ErrorDetail, ProcessingState, Stage,
    client::{DocumentPayload, MigrationApi},
    state::{Document, DocumentPatch},
};

/// Expand a glob into a state of documents that only know their source.
pub fn find_documents(pattern: &str) -> Result<ProcessingState, Error> {
    let context = ErrorContext::new("find_documents");
    let paths = glob::glob(pattern).map_err(|error| context.error(ErrorDetail::Pattern(error)))?;
    let documents = paths
        .map(|path| {
            let path = path.map_err(|error| context.error(ErrorDetail::Glob(error)))?;
            let path = path.canonicalize().map_err(|error| {
                context.error(ErrorDetail::DocumentPath {
                    path: path.clone(),
                    error,
                })
            })?;
            let source = Url::from_file_path(&path).map_err(|()| {
                context.error(ErrorDetail::DocumentPath {
                    path: path.clone(),
                    error: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "cannot be expressed as a file URL",
                    ),
                })
            })?;
            Ok(Document::from_source(source))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    info!(pattern, documents = documents.len(), "found documents");
    Ok(ProcessingState::new(documents))
}

/// Replace every document by what `f` makes of it. All documents are
/// processed concurrently; the result keeps their order. The first failure
/// fails the whole stage.
pub fn try_map_documents<F, Fut>(name: &'static str, f: F) -> Stage
where
    F: Fn(Document) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Document, Error>> + Send + 'static,
{
    let f = Arc::new(f);
    Stage::new(name, move |state: ProcessingState| {
        let f = f.clone();
        async move {
            let documents =
                try_join_all(state.documents().iter().cloned().map(f.as_ref())).await?;
            Ok(state.with_documents(documents))
        }
    })
}

/// Shallow-merge the result of `transform` onto every document.
pub fn map_documents<F, Fut, P>(transform: F) -> Stage
where
    F: Fn(Document) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<P>> + Send + 'static,
    P: Into<DocumentPatch>,
{
    let transform = Arc::new(transform);
    try_map_documents("map_documents", move |document| {
        let context = ErrorContext::document("map_documents", &document);
        let patch = transform(document.clone());
        async move {
            let patch = patch
                .await
                .map_err(|error| context.error(ErrorDetail::Transform(error)))?;
            Ok(document.merge(patch.into()))
        }
    })
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Send the field bag. When unset, documents are created or updated with
    /// empty `data`.
    pub include_fields: bool,
    /// Languages to sync. `None` syncs every document.
    pub only_languages: Option<HashSet<String>>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            include_fields: true,
            only_languages: None,
        }
    }
}

impl SyncOptions {
    pub fn without_fields(self) -> Self {
        Self {
            include_fields: false,
            ..self
        }
    }

    pub fn only_languages<I>(self, languages: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            only_languages: Some(languages.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    fn allows(&self, document: &Document) -> bool {
        match &self.only_languages {
            None => true,
            Some(languages) => document
                .lang
                .as_ref()
                .is_some_and(|lang| languages.contains(lang)),
        }
    }
}

/// Upsert every allowed document: update when it already has a remote id,
/// create otherwise. The id the API answers with is stored on the document.
pub fn sync_with_migration_release<C>(client: Arc<C>, options: SyncOptions) -> Stage
where
    C: MigrationApi + Send + Sync + 'static,
{
    const STAGE: &str = "sync_with_migration_release";
    let options = Arc::new(options);
    try_map_documents(STAGE, move |document| {
        let client = client.clone();
        let options = options.clone();
        async move {
            if !options.allows(&document) {
                debug!(
                    source = document.key().as_deref(),
                    lang = document.lang.as_deref(),
                    "skipped"
                );
                return Ok(document);
            }
            let context = ErrorContext::document(STAGE, &document);
            let payload = DocumentPayload::from_document(&document, options.include_fields);
            let id = match &document.id {
                Some(id) => client.update(id, &payload).await,
                None => client.create(&payload).await,
            }
            .map_err(|error| context.error(ErrorDetail::MigrationApi(error.into())))?;
            info!(
                source = document.key().as_deref(),
                id = id.as_str(),
                updated = document.id.is_some(),
                "synced"
            );
            Ok(Document {
                id: Some(id),
                ..document
            })
        }
    })
}

type CommonKey = dyn Fn(&Document) -> Option<String> + Send + Sync;

#[derive(Clone)]
pub struct AlternateLanguages {
    main_language: String,
    common_key: Arc<CommonKey>,
}

impl AlternateLanguages {
    /// Link documents sharing a `uid` to their `main_language` version.
    pub fn new(main_language: impl Into<String>) -> Self {
        Self {
            main_language: main_language.into(),
            common_key: Arc::new(|document: &Document| document.uid.clone()),
        }
    }

    pub fn common_key(
        self,
        common_key: impl Fn(&Document) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            common_key: Arc::new(common_key),
            ..self
        }
    }

    fn is_main(&self, document: &Document) -> bool {
        document.lang.as_deref() == Some(self.main_language.as_str())
    }
}

impl std::fmt::Debug for AlternateLanguages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlternateLanguages")
            .field("main_language", &self.main_language)
            .finish_non_exhaustive()
    }
}

/// Point every document outside the main language at the main language
/// document with the same common key. Documents without such a counterpart
/// end up without an alternate language id.
pub fn assign_alternate_languages(options: AlternateLanguages) -> Stage {
    Stage::new("assign_alternate_languages", move |state: ProcessingState| {
        let main = state
            .documents()
            .iter()
            .filter(|document| options.is_main(document))
            .filter_map(|document| {
                let key = (options.common_key)(document)?;
                Some((key, document.id.clone()?))
            })
            .collect::<HashMap<_, _>>();
        let documents = state
            .documents()
            .iter()
            .cloned()
            .map(|document| {
                if options.is_main(&document) {
                    return document;
                }
                let alternate_language_id =
                    (options.common_key)(&document).and_then(|key| main.get(&key).cloned());
                if alternate_language_id.is_none() {
                    debug!(
                        source = document.key().as_deref(),
                        lang = document.lang.as_deref(),
                        "no main language counterpart"
                    );
                }
                Document {
                    alternate_language_id,
                    ..document
                }
            })
            .collect();
        ready(Ok(state.with_documents(documents)))
    })
}
