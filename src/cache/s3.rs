//! S3 object store
//!
//! Implements [`ObjectStore`] on top of `aws-sdk-s3`. Credentials come from
//! the standard AWS provider chain.

use super::object_store::{DeleteOutcome, ObjectInfo, ObjectPage, ObjectStore};
use crate::config::schema::S3Config;
use crate::error::{PruneError, PruneResult};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::types::Object;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

/// Where the images live: endpoint, bucket and key prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    /// Custom endpoint (`https://host`), `None` for AWS itself
    pub endpoint: Option<String>,
    pub bucket: String,
    /// Key prefix, empty or ending in `/`
    pub prefix: String,
}

impl S3Location {
    /// Parse `s3://bucket/prefix/` or path-style `https://host/bucket/prefix/`
    pub fn parse(url: &str) -> PruneResult<Self> {
        let invalid = |reason: &str| PruneError::InvalidBackendUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let (endpoint, path) = if let Some(rest) = url.strip_prefix("s3://") {
            (None, rest)
        } else if let Some((scheme, rest)) = url.split_once("://") {
            if scheme != "https" && scheme != "http" {
                return Err(invalid("expected s3://, https:// or http://"));
            }
            let (host, path) = rest.split_once('/').unwrap_or((rest, ""));
            if host.is_empty() {
                return Err(invalid("missing host"));
            }
            (Some(format!("{scheme}://{host}")), path)
        } else {
            return Err(invalid("expected s3://, https:// or http://"));
        };

        let (bucket, prefix) = path.split_once('/').unwrap_or((path, ""));
        if bucket.is_empty() {
            return Err(invalid("missing bucket name"));
        }

        let prefix = prefix.trim_matches('/');
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };

        Ok(Self {
            endpoint,
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

/// S3 bucket accessed through the AWS SDK
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for `location` using the configured region and
    /// endpoint override
    pub async fn connect(location: &S3Location, config: &S3Config) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config).force_path_style(true);
        if let Some(endpoint) = location.endpoint.as_ref().or(config.endpoint.as_ref()) {
            builder = builder.endpoint_url(endpoint);
        }

        info!(
            bucket = %location.bucket,
            region = %config.region,
            endpoint = ?location.endpoint,
            "S3 client initialised"
        );

        Self {
            client: Client::from_conf(builder.build()),
            bucket: location.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self, token), fields(bucket = %self.bucket))]
    async fn list_page(&self, prefix: &str, token: Option<String>) -> PruneResult<ObjectPage> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .set_continuation_token(token)
            .send()
            .await
            .map_err(|e| {
                PruneError::object_store("ListObjectsV2", DisplayErrorContext(&e).to_string())
            })?;

        let objects: Vec<ObjectInfo> = resp
            .contents()
            .iter()
            .filter_map(object_info)
            .collect();

        debug!(count = objects.len(), "listed objects");
        Ok(ObjectPage {
            objects,
            next_token: resp.next_continuation_token().map(str::to_string),
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete_object(&self, key: &str) -> PruneResult<DeleteOutcome> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(err) => {
                let status = err.raw_response().map(|r| r.status().as_u16());
                if status == Some(404) {
                    Ok(DeleteOutcome::NotFound)
                } else {
                    Err(PruneError::object_store(
                        "DeleteObject",
                        DisplayErrorContext(&err).to_string(),
                    ))
                }
            }
        }
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Convert a listed object; objects without a usable timestamp are skipped
fn object_info(obj: &Object) -> Option<ObjectInfo> {
    let key = obj.key()?;
    let Some(last_modified) = obj
        .last_modified()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
    else {
        warn!(%key, "object has no last-modified time, not counted");
        return None;
    };

    Some(ObjectInfo {
        key: key.to_string(),
        size: obj.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
        last_modified,
    })
}
