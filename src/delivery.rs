use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The endpoint answered with a non-success status.
    #[error("endpoint rejected batch: {status}")]
    Rejected { status: StatusCode },

    /// The request never produced a response (connect, DNS, TLS, timeout).
    #[error("endpoint unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
#[error("failed to build HTTP client: {0}")]
pub struct ClientBuildError(#[from] reqwest::Error);

/// One outgoing batch, ready to send.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Performs a single network request for a batch.
///
/// Implementations return `Ok` only for a success (2xx) status.
pub trait DeliveryClient: Send + Sync + 'static {
    fn send(
        &self,
        request: DeliveryRequest,
    ) -> impl Future<Output = Result<StatusCode, DeliveryError>> + Send + '_;
}

pub struct HttpDeliveryClient {
    client: Client,
}

impl HttpDeliveryClient {
    /// `timeout` of `None` leaves requests without a deadline.
    pub fn new(timeout: Option<Duration>) -> Result<Self, ClientBuildError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl DeliveryClient for HttpDeliveryClient {
    async fn send(&self, request: DeliveryRequest) -> Result<StatusCode, DeliveryError> {
        let resp = self
            .client
            .post(request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(DeliveryError::Rejected { status })
        }
    }
}
