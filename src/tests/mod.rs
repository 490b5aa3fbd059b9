use std::{path::Path, sync::Arc};

use anyhow::{Context, anyhow};
use serde_json::{Value, json};
use url::Url;

use crate::{
    Pipeline, checkpoint,
    asset::{
        AssetLoader, FoundAsset, find_assets, find_assets_in_rich_text, sync_with_media_library,
    },
    client::local::{LocalMediaLibrary, LocalMigrationRelease, Request},
    document::{
        AlternateLanguages, SyncOptions, assign_alternate_languages, find_documents,
        map_documents, sync_with_migration_release,
    },
    resolver::{Resolvers, resolve_references},
    rich_text,
    schema::{DocumentSchema, SchemaRegistry},
    state::{Document, DocumentPatch, Fields},
};

mod sync;

/// Illustrated story chapters, one document per chapter and language.
struct Story;

impl DocumentSchema for Story {
    fn kind(&self) -> &str {
        "story"
    }

    fn find_assets(&self, document: &Document) -> anyhow::Result<Vec<FoundAsset>> {
        let mut found = Vec::new();
        if let Some(illustration) = document
            .data
            .get("chapterIllustration")
            .and_then(Value::as_str)
        {
            found.push(Url::parse(illustration)?.into());
        }
        if let Some(contents) = rich_text::from_field(&document.data, "contents") {
            found.extend(find_assets_in_rich_text(
                &contents?,
                document.source.as_ref(),
            )?);
        }
        Ok(found)
    }

    fn resolve_references(&self, data: Fields, resolvers: &Resolvers<'_>) -> Fields {
        let data = resolvers.link_field("chapterIllustration", data);
        let data = resolvers.link_field("previousChapter", data);
        let data = resolvers.link_field("nextChapter", data);
        resolvers.rich_text_field("contents", data)
    }
}

fn story(lang: &str, name: &str) -> Document {
    let mut data = Fields::new();
    data.insert("contents".into(), json!([]));
    Document {
        kind: Some("story".into()),
        lang: Some(lang.into()),
        uid: Some(format!("story-{name}")),
        title: Some(name.into()),
        data,
        ..Document::from_source(Url::parse(&format!("file:///content/{lang}/{name}.json")).unwrap())
    }
}

/// Turn an exported chapter into a story document.
async fn from_export(document: Document) -> anyhow::Result<DocumentPatch> {
    let source = document.source.context("document without source")?;
    let path = source
        .to_file_path()
        .map_err(|()| anyhow!("not a local file: {source}"))?;
    let export: Value = serde_json::from_str(&tokio::fs::read_to_string(&path).await?)?;
    let link = |name: &str| -> anyhow::Result<Option<Value>> {
        Ok(match export[name].as_str() {
            Some(href) => Some(json!(source.join(href)?.as_str())),
            None => None,
        })
    };
    let name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .context("unnamed export")?;

    let mut data = Fields::new();
    data.insert(
        "chapterTitle".into(),
        json!([{ "type": "heading1", "text": export["chapter"], "spans": [] }]),
    );
    for (field, key) in [
        ("chapterIllustration", "illustration"),
        ("previousChapter", "prev"),
        ("nextChapter", "next"),
    ] {
        if let Some(url) = link(key)? {
            data.insert(field.into(), url);
        }
    }
    data.insert("contents".into(), export["contents"].clone());
    Ok(DocumentPatch {
        kind: Some("story".into()),
        title: export["title"].as_str().map(str::to_owned),
        lang: export["lang"].as_str().map(str::to_owned),
        uid: Some(format!("story-{name}")),
        data: Some(data),
        ..Default::default()
    })
}

fn write_export(root: &Path, lang: &str, name: &str, export: Value) {
    let dir = root.join("stories").join(lang);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{name}.json")), export.to_string()).unwrap();
}

fn write_fixture(root: &Path) {
    std::fs::create_dir_all(root.join("stories/img")).unwrap();
    std::fs::write(root.join("stories/img/fox.png"), b"fox").unwrap();
    std::fs::write(root.join("stories/img/owl.png"), b"owl").unwrap();
    write_export(
        root,
        "en-us",
        "chapter-1",
        json!({
            "title": "The Fox",
            "lang": "en-us",
            "chapter": "Chapter 1",
            "illustration": "../img/fox.png",
            "next": "chapter-2.json",
            "contents": [
                {
                    "type": "paragraph",
                    "text": "Continue or read the notes",
                    "spans": [
                        { "start": 0, "end": 8, "type": "hyperlink", "data": { "url": "chapter-2.json" } },
                        { "start": 17, "end": 26, "type": "hyperlink", "data": { "url": "notes.json" } }
                    ]
                }
            ]
        }),
    );
    write_export(
        root,
        "en-us",
        "chapter-2",
        json!({
            "title": "The Owl",
            "lang": "en-us",
            "chapter": "Chapter 2",
            "prev": "chapter-1.json",
            "contents": [
                { "type": "image", "url": "../img/owl.png", "alt": "an owl" },
                { "type": "image", "url": "../img/fox.png" }
            ]
        }),
    );
    write_export(
        root,
        "fr-fr",
        "chapter-1",
        json!({
            "title": "Le Renard",
            "lang": "fr-fr",
            "chapter": "Chapitre 1",
            "illustration": "../img/fox.png",
            "contents": []
        }),
    );
    write_export(
        root,
        "fr-fr",
        "chapter-3",
        json!({
            "title": "Le Hibou",
            "lang": "fr-fr",
            "chapter": "Chapitre 3",
            "contents": []
        }),
    );
}

fn source(root: &Path, lang: &str, name: &str) -> String {
    let path = root
        .canonicalize()
        .unwrap()
        .join("stories")
        .join(lang)
        .join(format!("{name}.json"));
    Url::from_file_path(path).unwrap().to_string()
}

#[tokio::test]
async fn migrate_illustrated_stories() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_fixture(root);

    let release = Arc::new(LocalMigrationRelease::new());
    let library = Arc::new(LocalMediaLibrary::new());
    let registry = SchemaRegistry::new().with(Story);

    let pipeline = Pipeline::new()
        .then(map_documents(from_export))
        .then(sync_with_migration_release(
            release.clone(),
            SyncOptions::default()
                .without_fields()
                .only_languages(["en-us"]),
        ))
        .then(assign_alternate_languages(AlternateLanguages::new("en-us")))
        .then(sync_with_migration_release(
            release.clone(),
            SyncOptions::default().without_fields(),
        ))
        .then(find_assets(registry.clone()))
        .then(sync_with_media_library(library.clone(), AssetLoader::default()))
        .then(resolve_references(registry))
        .then(sync_with_migration_release(
            release.clone(),
            SyncOptions::default(),
        ))
        .then(checkpoint::dump(root.join("state/final.json")));
    assert_eq!(pipeline.len(), 9);

    let pattern = format!("{}/stories/*/*.json", root.display());
    let state = pipeline.run(find_documents(&pattern).unwrap()).await.unwrap();

    assert_eq!(state.documents().len(), 4);
    assert!(state.documents().iter().all(|document| document.id.is_some()));
    let requests = release.requests().await;
    assert_eq!(requests.len(), 10);
    assert_eq!(
        requests
            .iter()
            .filter(|request| matches!(request, Request::Create(_)))
            .count(),
        4
    );

    let document = |lang, name| state.document(&source(root, lang, name)).unwrap();
    let en_1 = document("en-us", "chapter-1");
    let en_2 = document("en-us", "chapter-2");
    let fr_1 = document("fr-fr", "chapter-1");
    let fr_3 = document("fr-fr", "chapter-3");
    assert_eq!(fr_1.alternate_language_id, en_1.id);
    assert_eq!(fr_3.alternate_language_id, None);
    assert_eq!(en_1.alternate_language_id, None);

    // fox.png is shared by three references but uploaded once
    let uploads = library.uploads().await;
    assert_eq!(uploads.len(), 2);
    assert_eq!(state.assets().len(), 2);
    let fox = state
        .assets()
        .values()
        .find(|asset| asset.url.path().ends_with("/img/fox.png"))
        .unwrap();
    let owl = state
        .assets()
        .values()
        .find(|asset| asset.url.path().ends_with("/img/owl.png"))
        .unwrap();
    assert_eq!(owl.alt.as_deref(), Some("an owl"));

    assert_eq!(
        en_1.data["chapterIllustration"],
        json!({ "id": fox.id, "link_type": "Media" })
    );
    assert_eq!(
        en_1.data["nextChapter"],
        json!({ "id": en_2.id, "link_type": "Document" })
    );
    assert_eq!(
        en_2.data["previousChapter"],
        json!({ "id": en_1.id, "link_type": "Document" })
    );
    let spans = &en_1.data["contents"][0]["spans"];
    assert_eq!(spans[0]["data"], json!({ "id": en_2.id, "link_type": "Document" }));
    assert_eq!(spans[1]["data"], json!({ "url": "notes.json" }));
    assert_eq!(
        en_2.data["contents"],
        json!([
            { "type": "image", "id": owl.id, "alt": "an owl" },
            { "type": "image", "id": fox.id }
        ])
    );

    // the release holds the final, resolved payloads
    let remote = release.documents().await;
    let remote_en_1 = &remote[en_1.id.as_deref().unwrap()];
    assert_eq!(remote_en_1.data, en_1.data);
    assert_eq!(remote[fr_1.id.as_deref().unwrap()].alternate_language_id, en_1.id);

    // resuming from the checkpoint only updates
    let resumed = checkpoint::read(&root.join("state/final.json")).await.unwrap();
    assert_eq!(resumed, state);
    let resynced = sync_with_migration_release(release.clone(), SyncOptions::default())
        .apply(resumed)
        .await
        .unwrap();
    assert_eq!(resynced, state);
    let requests = release.requests().await;
    assert_eq!(requests.len(), 14);
    assert!(
        requests[10..]
            .iter()
            .all(|request| matches!(request, Request::Update { .. }))
    );
}
