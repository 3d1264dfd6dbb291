//! S3-compatible object storage over plain HTTP (MinIO and friends).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::{
    attempt_id_from_file_name, listing_prefix, SnapshotKey, SnapshotMetadata, SnapshotObjectStore,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_LIST_PAGES: usize = 100;

#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, bucket: String, token: Option<String>) -> Result<Self> {
        let parsed = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("Invalid SNAPSHOT_STORE_URL {}: {}", endpoint, e)))?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: parsed.as_str().trim_end_matches('/').to_string(),
            bucket,
            token,
        })
    }

    fn object_url(&self, key: &SnapshotKey) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key.object_path())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn encode_header(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn unavailable(action: &str, status: StatusCode) -> Error {
    Error::StorageUnavailable(format!("object store {} failed with status {}", action, status))
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Text of every `<{tag}>` element in a ListObjectsV2 response body.
fn element_texts(body: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    body.split(open.as_str())
        .skip(1)
        .filter_map(|chunk| chunk.split_once(close.as_str()))
        .map(|(text, _)| xml_unescape(text.trim()))
        .collect()
}

/// One page of a ListObjectsV2 listing: its keys and the token for the next page, if any.
fn parse_list_page(body: &str) -> (Vec<String>, Option<String>) {
    let keys = element_texts(body, "Key");
    let truncated = element_texts(body, "IsTruncated")
        .first()
        .map_or(false, |v| v.eq_ignore_ascii_case("true"));
    let next = if truncated {
        element_texts(body, "NextContinuationToken").into_iter().next()
    } else {
        None
    };
    (keys, next)
}

#[async_trait]
impl SnapshotObjectStore for HttpObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload_snapshot(
        &self,
        key: &SnapshotKey,
        content: &str,
        metadata: &SnapshotMetadata,
    ) -> Result<String> {
        let mut request = self
            .client
            .put(self.object_url(key))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(content.to_string());
        if let Some(date) = metadata.date {
            request = request.header("x-amz-meta-date", date.to_string());
        }
        if let Some(version) = &metadata.attempt_version {
            request = request.header("x-amz-meta-attempt-version", encode_header(version));
        }

        let response = self.authorized(request).send().await?;
        if !response.status().is_success() {
            return Err(unavailable("upload", response.status()));
        }
        debug!(path = %key.object_path(), "snapshot uploaded");
        Ok(key.object_path())
    }

    async fn download_snapshot(&self, key: &SnapshotKey) -> Result<Option<String>> {
        let response = self
            .authorized(self.client.get(self.object_url(key)))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.text().await?)),
            status => Err(unavailable("download", status)),
        }
    }

    async fn delete_snapshot(&self, key: &SnapshotKey) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.object_url(key)))
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(unavailable("delete", status)),
        }
    }

    async fn list_snapshots(&self, student_id: Uuid, test_id: Uuid) -> Result<Vec<Uuid>> {
        let prefix = format!("{}/", listing_prefix(student_id, test_id));
        let mut ids = Vec::new();
        let mut token: Option<String> = None;
        for page in 1..=MAX_LIST_PAGES {
            let mut query = vec![("list-type", "2"), ("prefix", prefix.as_str())];
            if let Some(token) = &token {
                query.push(("continuation-token", token.as_str()));
            }
            let request = self
                .client
                .get(format!("{}/{}", self.endpoint, self.bucket))
                .query(&query);
            let response = self.authorized(request).send().await?;
            if !response.status().is_success() {
                return Err(unavailable("list", response.status()));
            }

            let body = response.text().await?;
            let (keys, next) = parse_list_page(&body);
            ids.extend(
                keys.iter()
                    .filter_map(|key| key.rsplit('/').next())
                    .filter_map(attempt_id_from_file_name),
            );
            match next {
                Some(next) => {
                    debug!(page, "snapshot listing continues");
                    token = Some(next);
                }
                None => {
                    ids.sort();
                    return Ok(ids);
                }
            }
        }
        Err(Error::StorageUnavailable(format!(
            "object store listing exceeded {} pages",
            MAX_LIST_PAGES
        )))
    }
}
