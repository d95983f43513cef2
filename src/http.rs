//! Shared hyper client for HTTPS calls.
//!
//! [`build_http_client`] builds the connection-pooled rustls client and
//! [`get`] performs a bounded-time GET, returning the status and body.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::StatusCode;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::DeckhandError;

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, Full<Bytes>>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[must_use]
pub fn build_http_client() -> HttpClient {
    // When multiple rustls crypto providers are compiled in (e.g. `--all-features`
    // pulls `aws-lc-rs` in through the AWS SDK), rustls cannot auto-detect which one
    // to use. Explicitly install `ring` as the default provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

/// GET `url` with extra headers.
pub async fn get(
    client: &HttpClient,
    url: &str,
    headers: &[(&str, &str)],
) -> Result<(StatusCode, Bytes), DeckhandError> {
    let uri: hyper::Uri =
        url.parse().map_err(
            |e: hyper::http::uri::InvalidUri| DeckhandError::UriParse {
                source: Box::new(e),
            },
        )?;

    let mut builder = hyper::Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder
        .body(Full::new(Bytes::new()))
        .map_err(|e| DeckhandError::HttpRequest {
            source: Box::new(e),
        })?;

    let response = tokio::time::timeout(REQUEST_TIMEOUT, client.request(req))
        .await
        .map_err(|_| DeckhandError::HttpRequest {
            source: format!("request timed out after {}s", REQUEST_TIMEOUT.as_secs()).into(),
        })?
        .map_err(|e| DeckhandError::HttpRequest {
            source: Box::new(e),
        })?;

    let status = response.status();
    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| DeckhandError::HttpRequest {
            source: Box::new(e),
        })?
        .to_bytes();
    Ok((status, body))
}
