use std::borrow::Cow;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::{client::AssetUpload, state::Asset};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to fetch remote asset ({url}): {error}")]
    FetchRemote {
        error: reqwest::Error,
        url: Url,
    },
    #[error("remote asset answered {code} ({url})")]
    Status {
        code: reqwest::StatusCode,
        url: Url,
    },
    #[error("invalid data URL: {error:?}")]
    DataUrl { error: data_url::DataUrlError },
    #[error("failed to decode data URL: {error}")]
    DecodeDataUrl {
        error: data_url::forgiving_base64::InvalidBase64,
    },
    #[error("failed to read local file ({url}): {error}")]
    ReadLocal {
        error: std::io::Error,
        url: Url,
    },
    #[error("not a local file path ({url})")]
    NotAFilePath { url: Url },
}

/// Reads asset bytes from wherever their URL points: the local filesystem,
/// an inline `data:` URL or the network.
#[derive(Debug, Clone, Default)]
pub struct AssetLoader {
    http: reqwest::Client,
}

struct Loaded {
    body: Bytes,
    content_type: Option<String>,
}

impl AssetLoader {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub async fn load(&self, asset: &Asset) -> Result<AssetUpload, Error> {
        let loaded = match asset.url.scheme() {
            "file" => load_local(&asset.url).await?,
            "data" => load_data_url(&asset.url)?,
            _ => self.load_remote(&asset.url).await?,
        };
        let content_type = loaded.content_type.unwrap_or_else(|| {
            mime_guess::from_path(derive_filename(&asset.url))
                .first_or_octet_stream()
                .essence_str()
                .to_owned()
        });
        let filename = match asset.url.scheme() {
            "data" => match data_url_extension(&content_type) {
                Some(extension) => format!("asset.{extension}"),
                None => "asset".to_owned(),
            },
            _ => derive_filename(&asset.url),
        };
        Ok(AssetUpload {
            filename,
            content_type,
            body: loaded.body,
            alt: asset.alt.clone(),
        })
    }

    async fn load_remote(&self, url: &Url) -> Result<Loaded, Error> {
        let fetch_error = |error: reqwest::Error| Error::FetchRemote {
            error,
            url: url.clone(),
        };
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(fetch_error)?;
        let code = response.status();
        if !code.is_success() {
            return Err(Error::Status {
                code,
                url: url.clone(),
            });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.map_err(fetch_error)?;
        Ok(Loaded { body, content_type })
    }
}

async fn load_local(url: &Url) -> Result<Loaded, Error> {
    let path = url
        .to_file_path()
        .map_err(|()| Error::NotAFilePath { url: url.clone() })?;
    let body = tokio::fs::read(path).await.map_err(|error| Error::ReadLocal {
        error,
        url: url.clone(),
    })?;
    Ok(Loaded {
        body: body.into(),
        content_type: None,
    })
}

fn load_data_url(url: &Url) -> Result<Loaded, Error> {
    let data =
        data_url::DataUrl::process(url.as_str()).map_err(|error| Error::DataUrl { error })?;
    let (body, _) = data
        .decode_to_vec()
        .map_err(|error| Error::DecodeDataUrl { error })?;
    let mime = data.mime_type();
    Ok(Loaded {
        body: body.into(),
        content_type: Some(format!("{}/{}", mime.type_, mime.subtype)),
    })
}

/// The subtype when it is a known extension of the type (`jpeg`, not
/// `jfif`), otherwise the first known extension.
fn data_url_extension(content_type: &str) -> Option<&'static str> {
    let extensions = mime_guess::get_mime_extensions_str(content_type)?;
    let subtype = content_type.split_once('/').map(|(_, subtype)| subtype);
    extensions
        .iter()
        .find(|extension| Some(**extension) == subtype)
        .or_else(|| extensions.first())
        .copied()
}

/// Last path segment, percent-decoded.
fn derive_filename(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| segment.to_owned())
        })
        .unwrap_or_else(|| "asset".to_owned())
}
