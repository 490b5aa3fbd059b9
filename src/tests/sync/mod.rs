use std::sync::Arc;

use serde_json::json;

use super::{Story, story};
use crate::{
    ErrorDetail, Pipeline, ProcessingState,
    asset::{AssetLoader, find_assets, sync_with_media_library},
    client::local::{LocalMediaLibrary, LocalMigrationRelease, Request},
    document::{SyncOptions, sync_with_migration_release},
    schema::SchemaRegistry,
};

fn chapters() -> ProcessingState {
    ProcessingState::new(vec![
        story("en-us", "chapter-1"),
        story("en-us", "chapter-2"),
        story("fr-fr", "chapter-1"),
    ])
}

#[tokio::test]
async fn resync_only_updates() {
    let release = Arc::new(LocalMigrationRelease::new());
    let stage = sync_with_migration_release(release.clone(), SyncOptions::default());

    let first = stage.apply(chapters()).await.unwrap();
    let second = stage.apply(first.clone()).await.unwrap();
    assert_eq!(first, second);

    let requests = release.requests().await;
    assert_eq!(requests.len(), 6);
    assert!(requests[..3].iter().all(|request| matches!(request, Request::Create(_))));
    assert!(
        requests[3..]
            .iter()
            .all(|request| matches!(request, Request::Update { .. }))
    );
    assert_eq!(release.documents().await.len(), 3);
}

#[tokio::test]
async fn language_filter_leaves_other_documents_alone() {
    let release = Arc::new(LocalMigrationRelease::new());
    let state = sync_with_migration_release(
        release.clone(),
        SyncOptions::default().only_languages(["fr-fr"]),
    )
    .apply(chapters())
    .await
    .unwrap();

    let ids = state
        .documents()
        .iter()
        .map(|document| document.id.as_deref())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![None, None, Some("doc-1")]);
    assert_eq!(release.requests().await.len(), 1);
}

#[tokio::test]
async fn fields_can_be_left_out() {
    let release = Arc::new(LocalMigrationRelease::new());
    sync_with_migration_release(release.clone(), SyncOptions::default().without_fields())
        .apply(ProcessingState::new(vec![story("en-us", "chapter-1")]))
        .await
        .unwrap();
    let documents = release.documents().await;
    let payload = &documents["doc-1"];
    assert!(payload.data.is_empty());
    assert_eq!(payload.uid.as_deref(), Some("story-chapter-1"));
    assert_eq!(payload.kind.as_deref(), Some("story"));
}

#[tokio::test]
async fn one_rejection_fails_the_stage() {
    let release = Arc::new(LocalMigrationRelease::rejecting(|payload| {
        payload.lang.as_deref() == Some("fr-fr")
    }));
    let error = Pipeline::new()
        .then(sync_with_migration_release(release.clone(), SyncOptions::default()))
        .run(chapters())
        .await
        .unwrap_err();

    assert_eq!(error.context.stage, "sync_with_migration_release");
    assert_eq!(
        error.context.locator.as_deref(),
        Some("file:///content/fr-fr/chapter-1.json")
    );
    assert!(matches!(*error.detail, ErrorDetail::MigrationApi(_)));
    // requests that went out before the failure are not rolled back
    assert_eq!(release.documents().await.len(), 2);
}

#[tokio::test]
async fn shared_assets_are_uploaded_once() {
    let dir = tempfile::tempdir().unwrap();
    let fox = dir.path().join("fox.png");
    std::fs::write(&fox, b"fox").unwrap();
    let fox = url::Url::from_file_path(&fox).unwrap();

    let documents = ["chapter-1", "chapter-2", "chapter-3"]
        .into_iter()
        .enumerate()
        .map(|(n, name)| {
            let mut document = story("en-us", name);
            document
                .data
                .insert("chapterIllustration".into(), json!(fox.as_str()));
            document.data.insert(
                "contents".into(),
                json!([{ "type": "image", "url": fox.as_str(), "alt": format!("fox {n}") }]),
            );
            document
        })
        .collect();

    let library = Arc::new(LocalMediaLibrary::new());
    let state = Pipeline::new()
        .then(find_assets(SchemaRegistry::new().with(Story)))
        .then(sync_with_media_library(library.clone(), AssetLoader::default()))
        .run(ProcessingState::new(documents))
        .await
        .unwrap();

    let uploads = library.uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1.filename, "fox.png");
    assert_eq!(uploads[0].1.alt.as_deref(), Some("fox 0"));
    assert_eq!(state.assets()[fox.as_str()].id.as_deref(), Some("asset-1"));
}
