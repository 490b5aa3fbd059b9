//! Asset discovery and media library synchronization.

use std::sync::Arc;

use futures::future::try_join_all;
use indexmap::map::Entry;
use tracing::{debug, info};
use url::Url;

use crate::{
    Error, ErrorContext, ErrorDetail, ProcessingState, Stage,
    client::AssetApi,
    rich_text::{Element, image_sources},
    state::{Asset, AssetIndex, Document},
};

pub mod loader;

pub use loader::AssetLoader;

/// An asset reference found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundAsset {
    pub url: Url,
    pub alt: Option<String>,
}

impl From<Url> for FoundAsset {
    fn from(url: Url) -> Self {
        Self { url, alt: None }
    }
}

/// Image sources of rich text content, made absolute against `base`.
pub fn find_assets_in_rich_text(
    content: &[Element],
    base: Option<&Url>,
) -> Result<Vec<FoundAsset>, url::ParseError> {
    image_sources(content)
        .into_iter()
        .map(|source| {
            let url = match base {
                Some(base) => base.join(source.url)?,
                None => Url::parse(source.url)?,
            };
            Ok(FoundAsset {
                url,
                alt: source.alt.map(str::to_owned),
            })
        })
        .collect()
}

/// Schema specific asset discovery.
pub trait AssetMapper {
    fn find_assets(
        &self,
        document: Document,
    ) -> impl Future<Output = anyhow::Result<Vec<FoundAsset>>> + Send;
}

impl<F, Fut> AssetMapper for F
where
    F: Fn(Document) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<FoundAsset>>> + Send,
{
    fn find_assets(
        &self,
        document: Document,
    ) -> impl Future<Output = anyhow::Result<Vec<FoundAsset>>> + Send {
        self(document)
    }
}

/// Fold found assets into a fresh index. The first alt text seen for a URL
/// wins; entries of `previous` are carried over with their remote id.
fn collect_assets(
    previous: &AssetIndex,
    found: impl IntoIterator<Item = FoundAsset>,
) -> AssetIndex {
    found.into_iter().fold(AssetIndex::new(), |mut index, found| {
        match index.entry(found.url.to_string()) {
            Entry::Occupied(mut entry) => {
                let asset = entry.get_mut();
                if asset.alt.is_none() {
                    asset.alt = found.alt;
                }
            }
            Entry::Vacant(entry) => {
                let mut asset = previous
                    .get(entry.key())
                    .cloned()
                    .unwrap_or_else(|| Asset::new(found.url));
                if asset.alt.is_none() {
                    asset.alt = found.alt;
                }
                entry.insert(asset);
            }
        }
        index
    })
}

pub fn find_assets<M>(mapper: M) -> Stage
where
    M: AssetMapper + Send + Sync + 'static,
{
    let mapper = Arc::new(mapper);
    Stage::new("find_assets", move |state: ProcessingState| {
        let mapper = mapper.clone();
        async move {
            let found = try_join_all(state.documents().iter().map(|document| {
                let mapper = &mapper;
                async move {
                    mapper.find_assets(document.clone()).await.map_err(|error| {
                        ErrorContext::document("find_assets", document)
                            .error(ErrorDetail::FindAssets(error))
                    })
                }
            }))
            .await?;
            let assets = collect_assets(state.assets(), found.into_iter().flatten());
            info!(assets = assets.len(), "collected assets");
            Ok(state.with_assets(assets))
        }
    })
}

async fn sync_asset<A: AssetApi>(
    api: &A,
    loader: &AssetLoader,
    asset: &Asset,
) -> Result<Asset, Error> {
    if asset.id.is_some() {
        return Ok(asset.clone());
    }
    let context = ErrorContext::asset("sync_with_media_library", asset);
    let upload = loader
        .load(asset)
        .await
        .map_err(|error| context.error(ErrorDetail::LoadAsset(error)))?;
    debug!(
        url = %asset.url,
        filename = upload.filename.as_str(),
        size = upload.body.len(),
        "uploading asset"
    );
    let id = api
        .upload(upload)
        .await
        .map_err(|error| context.error(ErrorDetail::AssetApi(error.into())))?;
    info!(url = %asset.url, id = id.as_str(), "uploaded asset");
    Ok(Asset {
        id: Some(id),
        ..asset.clone()
    })
}

/// Upload every asset that has no remote id yet.
pub fn sync_with_media_library<A>(api: Arc<A>, loader: AssetLoader) -> Stage
where
    A: AssetApi + Send + Sync + 'static,
{
    let loader = Arc::new(loader);
    Stage::new("sync_with_media_library", move |state: ProcessingState| {
        let api = api.clone();
        let loader = loader.clone();
        async move {
            let synced = try_join_all(state.assets().iter().map(|(key, asset)| {
                let (api, loader) = (&api, &loader);
                async move {
                    let asset = sync_asset(api.as_ref(), loader, asset).await?;
                    Ok::<_, Error>((key.clone(), asset))
                }
            }))
            .await?;
            Ok(state.with_assets(synced.into_iter().collect()))
        }
    })
}
