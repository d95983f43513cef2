//! S3-hosted Terraform statefile backend.
//!
//! Reads `s3://bucket/key` documents with the AWS SDK. The optional
//! `profile` and `region` keys of the `terraform:` section select the
//! credentials profile and region; otherwise the SDK default chain applies.

use async_trait::async_trait;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::Client;
use serde_json::Value;

use super::StateBackend;
use crate::error::DeckhandError;

const BACKEND: &str = "s3";

pub struct S3Backend {
    client: Client,
}

impl S3Backend {
    pub async fn new(profile: Option<&str>, region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;

        Self {
            client: Client::new(&sdk_config),
        }
    }
}

/// Split `s3://bucket/path/to/key` into bucket and key.
pub fn parse_location(location: &str) -> Result<(String, String), DeckhandError> {
    let url = url::Url::parse(location).map_err(|e| DeckhandError::UriParse {
        source: Box::new(e),
    })?;
    let bucket = url.host_str().unwrap_or_default();
    let key = url.path().trim_start_matches('/');
    if url.scheme() != "s3" || bucket.is_empty() || key.is_empty() {
        return Err(DeckhandError::UriParse {
            source: format!("'{location}' is not an s3://bucket/key URL").into(),
        });
    }
    Ok((bucket.to_string(), key.to_string()))
}

#[async_trait]
impl StateBackend for S3Backend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn fetch(&self, location: &str) -> Result<Value, DeckhandError> {
        let (bucket, key) = parse_location(location)?;

        let output = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(GetObjectError::is_no_such_key) {
                    DeckhandError::NoSuchStateFile {
                        location: location.to_string(),
                    }
                } else {
                    DeckhandError::RemoteState {
                        backend: BACKEND,
                        source: Box::new(e),
                    }
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| DeckhandError::RemoteState {
                backend: BACKEND,
                source: Box::new(e),
            })?
            .into_bytes();

        serde_json::from_slice(&body).map_err(|e| DeckhandError::StateFormat {
            location: location.to_string(),
            message: e.to_string(),
        })
    }
}
