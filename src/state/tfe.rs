//! Managed Terraform state service backend.
//!
//! Looks up the current state version of an `organization/workspace` pair
//! through the JSON:API endpoint (bearer-token auth), then downloads the
//! hosted state document it points at.
//!
//! | Flag           | Env var       |
//! |----------------|---------------|
//! | `--tfe-token`  | `ATLAS_TOKEN` |

use async_trait::async_trait;
use hyper::StatusCode;
use serde_json::Value;

use super::StateBackend;
use crate::error::DeckhandError;
use crate::http::{self, HttpClient};

pub const TERRAFORM_API_ENDPOINT: &str = "https://app.terraform.io/api/v2";

const BACKEND: &str = "terraform-enterprise";

pub struct TfeBackend {
    client: HttpClient,
    token: String,
    endpoint: String,
}

impl TfeBackend {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_endpoint(token, TERRAFORM_API_ENDPOINT)
    }

    #[must_use]
    pub fn with_endpoint(token: impl Into<String>, endpoint: &str) -> Self {
        Self {
            client: http::build_http_client(),
            token: token.into(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        location: &str,
    ) -> Result<Value, DeckhandError> {
        let (status, body) = http::get(&self.client, url, headers).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(DeckhandError::NoSuchStateFile {
                location: location.to_string(),
            });
        }
        if !status.is_success() {
            return Err(DeckhandError::RemoteState {
                backend: BACKEND,
                source: format!("GET {url} returned {status}").into(),
            });
        }
        serde_json::from_slice(&body).map_err(|e| DeckhandError::StateFormat {
            location: location.to_string(),
            message: e.to_string(),
        })
    }
}

/// Build the state-versions query for one workspace.
pub fn state_versions_url(
    endpoint: &str,
    organization: &str,
    workspace: &str,
) -> Result<String, DeckhandError> {
    let mut url = url::Url::parse(&format!("{endpoint}/state-versions")).map_err(|e| {
        DeckhandError::UriParse {
            source: Box::new(e),
        }
    })?;
    url.query_pairs_mut()
        .append_pair("filter[organization][name]", organization)
        .append_pair("filter[workspace][name]", workspace);
    Ok(url.into())
}

/// Pull the hosted download URL out of a state-versions response.
pub fn download_url(response: &Value) -> Option<&str> {
    response
        .get("data")?
        .get(0)?
        .get("attributes")?
        .get("hosted-state-download-url")?
        .as_str()
}

#[async_trait]
impl StateBackend for TfeBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    /// `location` is `organization/workspace`.
    async fn fetch(&self, location: &str) -> Result<Value, DeckhandError> {
        let (organization, workspace) =
            location
                .split_once('/')
                .ok_or_else(|| DeckhandError::StateFormat {
                    location: location.to_string(),
                    message: "expected organization/workspace".into(),
                })?;

        let url = state_versions_url(&self.endpoint, organization, workspace)?;
        let bearer = format!("Bearer {}", self.token);
        let versions = self
            .get_json(
                &url,
                &[
                    ("authorization", bearer.as_str()),
                    ("content-type", "application/vnd.api+json"),
                ],
                location,
            )
            .await?;

        let Some(download) = download_url(&versions) else {
            return Err(DeckhandError::NoSuchStateFile {
                location: location.to_string(),
            });
        };
        tracing::debug!(location, "downloading hosted terraform state");
        self.get_json(download, &[], location).await
    }
}
