use reqwest::{
    Method, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderValue, InvalidHeaderValue},
    multipart::{Form, Part},
};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{
    AssetApi, AssetUpload, ClientConfig, DocumentPayload, MigrationApi, RequestPolicy, Throttle,
    throttle::Retryable,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("request failed. status: {code}, body: {body}")]
    Status { code: StatusCode, body: String },
    #[error("invalid endpoint: {0}")]
    Endpoint(url::ParseError),
    #[error("invalid header value: {0}")]
    Header(InvalidHeaderValue),
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(error) => !(error.is_builder() || error.is_decode()),
            Error::Status { code, .. } => {
                *code == StatusCode::TOO_MANY_REQUESTS || code.is_server_error()
            }
            Error::Endpoint(_) | Error::Header(_) => false,
        }
    }
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

/// Shared part of both write API clients.
struct Connection {
    http: reqwest::Client,
    base: Url,
    token: String,
    throttle: Throttle,
}

impl Connection {
    fn new(config: &ClientConfig, policy: RequestPolicy) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            "repository",
            HeaderValue::from_str(&config.repository).map_err(Error::Header)?,
        );
        if let Some(api_key) = &config.api_key {
            let mut api_key = HeaderValue::from_str(api_key).map_err(Error::Header)?;
            api_key.set_sensitive(true);
            headers.insert("x-api-key", api_key);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(Error::Transport)?;

        // joining onto a base without a trailing slash would drop its last segment
        let mut base = config.base_url.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Ok(Self {
            http,
            base,
            token: config.token.clone(),
            throttle: Throttle::new(policy),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base.join(path).map_err(Error::Endpoint)
    }

    async fn send<F>(&self, build: F) -> Result<String, Error>
    where
        F: Fn(&reqwest::Client) -> Result<reqwest::RequestBuilder, Error>,
    {
        self.throttle
            .run(|| {
                let request = build(&self.http).map(|request| request.bearer_auth(&self.token));
                async move {
                    let response = request?.send().await.map_err(Error::Transport)?;
                    read_id(response).await
                }
            })
            .await
    }
}

async fn read_id(response: reqwest::Response) -> Result<String, Error> {
    let code = response.status();
    if !code.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Status { code, body });
    }
    let created = response.json::<Created>().await.map_err(Error::Transport)?;
    debug!(%code, id = created.id.as_str(), "accepted");
    Ok(created.id)
}

/// Client of the document migration API.
pub struct MigrationClient {
    connection: Connection,
}

impl MigrationClient {
    pub fn new(config: &ClientConfig, policy: RequestPolicy) -> Result<Self, Error> {
        Ok(Self {
            connection: Connection::new(config, policy)?,
        })
    }

    async fn upsert(
        &self,
        method: Method,
        endpoint: Url,
        payload: &DocumentPayload,
    ) -> Result<String, Error> {
        self.connection
            .send(|http| Ok(http.request(method.clone(), endpoint.clone()).json(payload)))
            .await
    }
}

impl MigrationApi for MigrationClient {
    type Error = Error;

    async fn create(&self, payload: &DocumentPayload) -> Result<String, Self::Error> {
        let endpoint = self.connection.endpoint("documents")?;
        self.upsert(Method::POST, endpoint, payload).await
    }

    async fn update(&self, id: &str, payload: &DocumentPayload) -> Result<String, Self::Error> {
        let endpoint = self
            .connection
            .endpoint(&format!("documents/{}", urlencoding::encode(id)))?;
        self.upsert(Method::PUT, endpoint, payload).await
    }
}

/// Client of the media library (asset) API.
pub struct AssetClient {
    connection: Connection,
}

impl AssetClient {
    pub fn new(config: &ClientConfig, policy: RequestPolicy) -> Result<Self, Error> {
        Ok(Self {
            connection: Connection::new(config, policy)?,
        })
    }
}

fn upload_form(upload: &AssetUpload) -> Result<Form, Error> {
    let file = Part::stream_with_length(upload.body.clone(), upload.body.len() as u64)
        .file_name(upload.filename.clone())
        .mime_str(&upload.content_type)
        .map_err(Error::Transport)?;
    let form = Form::new().part("file", file);
    Ok(match &upload.alt {
        Some(alt) => form.text("alt", alt.clone()),
        None => form,
    })
}

impl AssetApi for AssetClient {
    type Error = Error;

    async fn upload(&self, upload: AssetUpload) -> Result<String, Self::Error> {
        let endpoint = self.connection.endpoint("assets")?;
        // a multipart body is consumed by sending it, so every attempt builds its own
        self.connection
            .send(|http| Ok(http.post(endpoint.clone()).multipart(upload_form(&upload)?)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, body_string_contains, header, header_exists, method, path},
    };

    use super::*;
    use crate::{client::RetryPolicy, state::Fields};

    fn config(server: &MockServer, api_key: Option<&str>) -> ClientConfig {
        ClientConfig {
            base_url: Url::parse(&server.uri()).unwrap(),
            repository: "my-repo".into(),
            token: "write-token".into(),
            api_key: api_key.map(str::to_owned),
            timeout: Duration::from_secs(5),
        }
    }

    fn payload() -> DocumentPayload {
        DocumentPayload {
            title: Some("Chapter 1".into()),
            kind: Some("story".into()),
            lang: Some("en-us".into()),
            uid: Some("story-chapter-1".into()),
            alternate_language_id: None,
            data: Fields::new(),
        }
    }

    #[tokio::test]
    async fn create_posts_with_write_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents"))
            .and(header("authorization", "Bearer write-token"))
            .and(header("repository", "my-repo"))
            .and(header("x-api-key", "migration-key"))
            .and(header("accept", "application/json"))
            .and(body_json(json!({
                "title": "Chapter 1",
                "type": "story",
                "lang": "en-us",
                "uid": "story-chapter-1",
                "data": {}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "DOC-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MigrationClient::new(
            &config(&server, Some("migration-key")),
            RequestPolicy::unthrottled(),
        )
        .unwrap();
        assert_eq!(client.create(&payload()).await.unwrap(), "DOC-1");
    }

    #[tokio::test]
    async fn update_puts_to_document_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/documents/DOC-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "DOC-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            MigrationClient::new(&config(&server, None), RequestPolicy::unthrottled()).unwrap();
        assert_eq!(client.update("DOC-1", &payload()).await.unwrap(), "DOC-1");
    }

    #[tokio::test]
    async fn base_path_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/documents"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "DOC-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config(&server, None);
        config.base_url = Url::parse(&format!("{}/v2", server.uri())).unwrap();
        let client = MigrationClient::new(&config, RequestPolicy::unthrottled()).unwrap();
        assert_eq!(client.create(&payload()).await.unwrap(), "DOC-1");
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/documents"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "DOC-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let policy = RequestPolicy {
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(10),
            },
            ..RequestPolicy::unthrottled()
        };
        let client = MigrationClient::new(&config(&server, None), policy).unwrap();
        assert_eq!(client.create(&payload()).await.unwrap(), "DOC-1");
    }

    #[tokio::test]
    async fn validation_errors_fail_at_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents"))
            .respond_with(ResponseTemplate::new(400).set_body_string("uid is required"))
            .expect(1)
            .mount(&server)
            .await;

        let policy = RequestPolicy {
            retry: RetryPolicy::default(),
            ..RequestPolicy::unthrottled()
        };
        let client = MigrationClient::new(&config(&server, None), policy).unwrap();
        match client.create(&payload()).await {
            Err(Error::Status { code, body }) => {
                assert_eq!(code, StatusCode::BAD_REQUEST);
                assert_eq!(body, "uid is required");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_sends_multipart_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/assets"))
            .and(header("authorization", "Bearer write-token"))
            .and(header_exists("content-type"))
            .and(body_string_contains("name=\"file\"; filename=\"fox.png\""))
            .and(body_string_contains("name=\"alt\""))
            .and(body_string_contains("a fox"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "ASSET-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            AssetClient::new(&config(&server, None), RequestPolicy::unthrottled()).unwrap();
        let id = client
            .upload(AssetUpload {
                filename: "fox.png".into(),
                content_type: "image/png".into(),
                body: Bytes::from_static(b"not really a png"),
                alt: Some("a fox".into()),
            })
            .await
            .unwrap();
        assert_eq!(id, "ASSET-1");
    }
}
