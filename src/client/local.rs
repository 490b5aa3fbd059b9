//! In-memory write APIs for dry runs and tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use tokio::sync::Mutex;

use super::{AssetApi, AssetUpload, DocumentPayload, MigrationApi};

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Create(DocumentPayload),
    Update { id: String, payload: DocumentPayload },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("document rejected (uid: {uid:?})")]
    Rejected { uid: Option<String> },
    #[error("no such document: {0}")]
    UnknownDocument(String),
}

type Rejection = Box<dyn Fn(&DocumentPayload) -> bool + Send + Sync>;

/// Migration release kept in memory. Ids are handed out as `doc-1`, `doc-2`, ...
#[derive(Default)]
pub struct LocalMigrationRelease {
    documents: Mutex<IndexMap<String, DocumentPayload>>,
    requests: Mutex<Vec<Request>>,
    next_id: AtomicUsize,
    reject: Option<Rejection>,
}

impl LocalMigrationRelease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every request whose payload matches `reject`.
    pub fn rejecting(reject: impl Fn(&DocumentPayload) -> bool + Send + Sync + 'static) -> Self {
        Self {
            reject: Some(Box::new(reject)),
            ..Self::default()
        }
    }

    /// Start from documents that already exist remotely.
    pub fn with_existing(documents: impl IntoIterator<Item = (String, DocumentPayload)>) -> Self {
        Self {
            documents: Mutex::new(documents.into_iter().collect()),
            ..Self::default()
        }
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.requests.lock().await.clone()
    }

    pub async fn documents(&self) -> IndexMap<String, DocumentPayload> {
        self.documents.lock().await.clone()
    }

    fn check(&self, payload: &DocumentPayload) -> Result<(), Error> {
        match &self.reject {
            Some(reject) if reject(payload) => Err(Error::Rejected {
                uid: payload.uid.clone(),
            }),
            _ => Ok(()),
        }
    }
}

impl MigrationApi for LocalMigrationRelease {
    type Error = Error;

    async fn create(&self, payload: &DocumentPayload) -> Result<String, Self::Error> {
        self.requests
            .lock()
            .await
            .push(Request::Create(payload.clone()));
        self.check(payload)?;
        let mut documents = self.documents.lock().await;
        // seeded documents may already hold `doc-N` ids
        let id = loop {
            let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            if !documents.contains_key(&id) {
                break id;
            }
        };
        documents.insert(id.clone(), payload.clone());
        Ok(id)
    }

    async fn update(&self, id: &str, payload: &DocumentPayload) -> Result<String, Self::Error> {
        self.requests.lock().await.push(Request::Update {
            id: id.to_owned(),
            payload: payload.clone(),
        });
        self.check(payload)?;
        let mut documents = self.documents.lock().await;
        let document = documents
            .get_mut(id)
            .ok_or_else(|| Error::UnknownDocument(id.to_owned()))?;
        *document = payload.clone();
        Ok(id.to_owned())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {}

/// Media library kept in memory. Ids are handed out as `asset-1`, `asset-2`, ...
#[derive(Default)]
pub struct LocalMediaLibrary {
    uploads: Mutex<Vec<(String, AssetUpload)>>,
}

impl LocalMediaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn uploads(&self) -> Vec<(String, AssetUpload)> {
        self.uploads.lock().await.clone()
    }
}

impl AssetApi for LocalMediaLibrary {
    type Error = UploadError;

    async fn upload(&self, upload: AssetUpload) -> Result<String, Self::Error> {
        let mut uploads = self.uploads.lock().await;
        let id = format!("asset-{}", uploads.len() + 1);
        uploads.push((id.clone(), upload));
        Ok(id)
    }
}
