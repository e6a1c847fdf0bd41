//! S3 Client Module
//!
//! Object store client for S3 and S3-compatible endpoints. Path-style addressing,
//! SigV4-signed requests, ListObjects (v1) pagination and multi-object delete.

use crate::config::{ConnectionPoolConfig, StoreConfig};
use crate::connection_pool::{full_body, BufferedResponse, PooledClient};
use crate::content_hash::{content_md5, CONTENT_MD5};
use crate::sigv4::{sha256_hex, SigV4Signer};
use crate::{ProxyError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, Method, Request, Uri};
use tracing::{debug, warn};

/// Largest page ListObjects returns and the most keys one delete request accepts
pub const MAX_KEYS_PER_REQUEST: usize = 1000;

/// One page of a bucket listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Marker for the next page, `None` once the store reports the listing complete
    pub next_marker: Option<String>,
}

/// Operations the proxy and the purge job need from an object store.
///
/// Keys may carry a leading '/', which is not part of the stored object name.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, headers: HeaderMap) -> Result<()>;

    async fn list(&self, prefix: Option<&str>, marker: Option<&str>) -> Result<ListPage>;

    /// Delete every key in one request; any per-key error fails the whole call
    async fn delete_many(&self, keys: &[String]) -> Result<()>;
}

pub struct S3Client {
    client: PooledClient,
    endpoint: String,
    bucket: String,
    signer: SigV4Signer,
    max_keys: usize,
}

impl S3Client {
    pub fn new(store: &StoreConfig, pool: &ConnectionPoolConfig) -> Result<Self> {
        let endpoint = store.endpoint.trim_end_matches('/').to_string();
        endpoint.parse::<Uri>().map_err(|e| {
            ProxyError::ConfigError(format!("Invalid store endpoint '{}': {}", endpoint, e))
        })?;

        Ok(Self {
            client: PooledClient::new("store", pool, store.request_timeout)?,
            endpoint,
            bucket: store.bucket.clone(),
            signer: SigV4Signer::new(
                store.access_key_id.clone(),
                store.secret_access_key.clone(),
                store.region.clone(),
            ),
            max_keys: MAX_KEYS_PER_REQUEST,
        })
    }

    /// Page size requested from ListObjects, clamped to 1..=1000
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.clamp(1, MAX_KEYS_PER_REQUEST);
        self
    }

    /// Keys arrive as request paths, already percent-encoded; each segment is
    /// decoded first so an existing escape is sent once, not as `%25XX`.
    fn object_url(&self, key: &str) -> String {
        let encoded = object_name(key)
            .split('/')
            .map(|segment| match urlencoding::decode(segment) {
                Ok(decoded) => urlencoding::encode(&decoded).into_owned(),
                Err(_) => urlencoding::encode(segment).into_owned(),
            })
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}/{}", self.endpoint, self.bucket, encoded)
    }

    fn bucket_url(&self, query: &str) -> String {
        format!("{}/{}?{}", self.endpoint, self.bucket, query)
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        mut headers: HeaderMap,
        body: Bytes,
    ) -> Result<BufferedResponse> {
        let uri: Uri = url
            .parse()
            .map_err(|e| ProxyError::StoreError(format!("Invalid store URL '{}': {}", url, e)))?;

        self.signer.sign(
            &method,
            &uri,
            &mut headers,
            &sha256_hex(&body),
            chrono::Utc::now(),
        )?;

        let mut request = Request::builder()
            .method(method.clone())
            .uri(uri)
            .body(full_body(body))?;
        *request.headers_mut() = headers;

        let response = self
            .client
            .send(request)
            .await
            .map_err(|e| ProxyError::StoreError(format!("{} {} failed: {}", method, url, e)))?;

        if !response.status.is_success() {
            let detail = String::from_utf8_lossy(&response.body);
            return Err(ProxyError::StoreError(format!(
                "{} {} returned {}: {}",
                method,
                url,
                response.status.as_u16(),
                describe_error(&detail)
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put(&self, key: &str, body: Bytes, headers: HeaderMap) -> Result<()> {
        let url = self.object_url(key);
        let size = body.len();
        self.execute(Method::PUT, &url, headers, body).await?;
        debug!("Stored object: key={}, bytes={}", key, size);
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>, marker: Option<&str>) -> Result<ListPage> {
        let mut query = Vec::new();
        if let Some(marker) = marker {
            query.push(format!("marker={}", urlencoding::encode(marker)));
        }
        query.push(format!("max-keys={}", self.max_keys));
        if let Some(prefix) = prefix {
            query.push(format!("prefix={}", urlencoding::encode(object_name(prefix))));
        }

        let url = self.bucket_url(&query.join("&"));
        let response = self
            .execute(Method::GET, &url, HeaderMap::new(), Bytes::new())
            .await?;

        let xml = std::str::from_utf8(&response.body).map_err(|e| {
            ProxyError::SerializationError(format!("ListObjects response is not UTF-8: {}", e))
        })?;
        parse_list_response(xml)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        if keys.len() > MAX_KEYS_PER_REQUEST {
            return Err(ProxyError::InvalidRequest(format!(
                "Cannot delete {} keys in one request (max {})",
                keys.len(),
                MAX_KEYS_PER_REQUEST
            )));
        }

        let body = delete_request_body(keys);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        headers.insert(
            CONTENT_MD5,
            HeaderValue::from_str(&content_md5(body.as_bytes())).map_err(|e| {
                ProxyError::InvalidRequest(format!("Invalid Content-MD5 value: {}", e))
            })?,
        );

        let url = self.bucket_url("delete");
        let response = self
            .execute(Method::POST, &url, headers, Bytes::from(body))
            .await?;

        let xml = String::from_utf8_lossy(&response.body);
        let errors = xml_blocks(&xml, "Error");
        if let Some(first) = errors.first() {
            let key = xml_value(first, "Key").map(unescape_xml).unwrap_or_default();
            warn!(
                "Multi-object delete reported {} errors, first on key '{}'",
                errors.len(),
                key
            );
            return Err(ProxyError::StoreError(format!(
                "Delete failed for {} of {} keys (first: '{}': {})",
                errors.len(),
                keys.len(),
                key,
                describe_error(first)
            )));
        }

        debug!("Deleted {} objects", keys.len());
        Ok(())
    }
}

fn object_name(key: &str) -> &str {
    key.strip_prefix('/').unwrap_or(key)
}

fn describe_error(xml: &str) -> String {
    match (xml_value(xml, "Code"), xml_value(xml, "Message")) {
        (Some(code), Some(message)) => format!("{} ({})", code, unescape_xml(message)),
        (Some(code), None) => code.to_string(),
        _ => xml.trim().chars().take(200).collect(),
    }
}

/// Body of a quiet multi-object delete request
pub fn delete_request_body(keys: &[String]) -> String {
    let mut body = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Delete><Quiet>true</Quiet>"#);
    for key in keys {
        body.push_str("<Object><Key>");
        body.push_str(&escape_xml(key));
        body.push_str("</Key></Object>");
    }
    body.push_str("</Delete>");
    body
}

/// Parse a ListObjects (v1) result into one page
pub fn parse_list_response(xml: &str) -> Result<ListPage> {
    if !xml.contains("<ListBucketResult") {
        return Err(ProxyError::SerializationError(
            "Missing <ListBucketResult> in listing response".to_string(),
        ));
    }

    let keys: Vec<String> = xml_blocks(xml, "Contents")
        .into_iter()
        .filter_map(|block| xml_value(block, "Key"))
        .map(unescape_xml)
        .collect();

    let truncated = xml_value(xml, "IsTruncated")
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let next_marker = if truncated {
        xml_value(xml, "NextMarker")
            .filter(|marker| !marker.is_empty())
            .map(unescape_xml)
            .or_else(|| keys.last().cloned())
    } else {
        None
    };

    Ok(ListPage { keys, next_marker })
}

/// Text of the first `<tag>` element, trimmed
fn xml_value<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let start_tag = format!("<{}>", tag);
    let end_tag = format!("</{}>", tag);

    let start = xml.find(&start_tag)? + start_tag.len();
    let end = xml[start..].find(&end_tag)? + start;
    Some(xml[start..end].trim())
}

/// Inner text of every `<tag>` element, in document order
fn xml_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let start_tag = format!("<{}>", tag);
    let end_tag = format!("</{}>", tag);

    let mut blocks = Vec::new();
    let mut rest = xml;
    while let Some(open) = rest.find(&start_tag) {
        let inner = &rest[open + start_tag.len()..];
        let Some(close) = inner.find(&end_tag) else {
            break;
        };
        blocks.push(&inner[..close]);
        rest = &inner[close + end_tag.len()..];
    }
    blocks
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn unescape_xml(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };

        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=semi]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}
