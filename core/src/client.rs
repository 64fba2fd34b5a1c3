use std::sync::Arc;

use async_trait::async_trait;
use imagesearch_protocol::RpcCode;
use imagesearch_protocol::RpcError;
use imagesearch_protocol::SearchImagesRequest;
use imagesearch_protocol::SearchImagesResponse;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderValue;
use tracing::debug;

use crate::executor::CallExecutor;
use crate::metadata::CallMetadata;

pub const SEARCH_IMAGES_DESCRIPTION: &str = "search images";

const SEARCH_IMAGES_PATH: &str = "/v1/images:search";

/// Unary call surface of the backend service.
#[async_trait]
pub trait ImageSearchTransport: Send + Sync {
    async fn search_images(
        &self,
        request: SearchImagesRequest,
        metadata: CallMetadata,
    ) -> Result<SearchImagesResponse, RpcError>;
}

#[derive(Clone, Debug)]
pub struct HttpImageSearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpImageSearchClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ImageSearchTransport for HttpImageSearchClient {
    async fn search_images(
        &self,
        request: SearchImagesRequest,
        metadata: CallMetadata,
    ) -> Result<SearchImagesResponse, RpcError> {
        let timeout = metadata.remaining();
        if timeout.is_zero() {
            return Err(RpcError::new(
                RpcCode::DeadlineExceeded,
                "deadline exceeded before the request was sent",
            ));
        }

        let mut headers = metadata.headers;
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let url = format!("{}{SEARCH_IMAGES_PATH}", self.base_url);
        debug!(query = %request.query, page = request.page, "POST {url}");

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        resp.json::<SearchImagesResponse>()
            .await
            .map_err(|err| RpcError::new(RpcCode::Internal, format!("invalid response: {err}")))
    }
}

fn transport_error(err: reqwest::Error) -> RpcError {
    if err.is_timeout() {
        RpcError::new(RpcCode::DeadlineExceeded, "deadline exceeded")
    } else {
        RpcError::new(RpcCode::Unavailable, err.to_string())
    }
}

fn status_error(status: reqwest::StatusCode, body: &str) -> RpcError {
    let code = RpcCode::from_http_status(status.as_u16());
    match serde_json::from_str::<RpcError>(body) {
        Ok(remote) => RpcError::new(code, remote.message),
        Err(_) => RpcError::new(code, format!("search request failed: {status} - {body}")),
    }
}

/// Direct-command entry point: one search call through the executor.
#[derive(Clone)]
pub struct ImageService {
    executor: CallExecutor,
    transport: Arc<dyn ImageSearchTransport>,
}

impl ImageService {
    pub fn new(executor: CallExecutor, transport: Arc<dyn ImageSearchTransport>) -> Self {
        Self {
            executor,
            transport,
        }
    }

    pub fn executor(&self) -> &CallExecutor {
        &self.executor
    }

    pub fn transport(&self) -> &Arc<dyn ImageSearchTransport> {
        &self.transport
    }

    pub async fn search_images(
        &self,
        request: SearchImagesRequest,
    ) -> Result<SearchImagesResponse, RpcError> {
        let transport = Arc::clone(&self.transport);
        self.executor
            .execute(SEARCH_IMAGES_DESCRIPTION, move |metadata| {
                let transport = Arc::clone(&transport);
                let request = request.clone();
                async move { transport.search_images(request, metadata).await }
            })
            .await
    }
}
