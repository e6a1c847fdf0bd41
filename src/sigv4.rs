//! AWS Signature Version 4 request signing for the S3 client.

use crate::{ProxyError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, HOST};
use hyper::{Method, Uri};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

pub const X_AMZ_DATE: HeaderName = HeaderName::from_static("x-amz-date");
pub const X_AMZ_CONTENT_SHA256: HeaderName = HeaderName::from_static("x-amz-content-sha256");

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ProxyError::SystemError(format!("HMAC key rejected: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[derive(Clone)]
pub struct SigV4Signer {
    access_key_id: String,
    secret_access_key: String,
    region: String,
    service: &'static str,
}

impl std::fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigV4Signer")
            .field("access_key_id", &self.access_key_id)
            .field("region", &self.region)
            .field("service", &self.service)
            .finish()
    }
}

impl SigV4Signer {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
            service: "s3",
        }
    }

    /// Sign a request in place.
    ///
    /// Adds Host, X-Amz-Date, X-Amz-Content-Sha256 and Authorization. Every header
    /// already present in `headers` is included in the signature.
    pub fn sign(
        &self,
        method: &Method,
        uri: &Uri,
        headers: &mut HeaderMap,
        payload_sha256: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        let host = uri
            .authority()
            .ok_or_else(|| ProxyError::InvalidRequest(format!("No host in URI: {}", uri)))?
            .as_str();

        headers.insert(HOST, header_value(host)?);
        headers.insert(X_AMZ_DATE, header_value(&amz_date)?);
        headers.insert(X_AMZ_CONTENT_SHA256, header_value(payload_sha256)?);
        headers.remove(AUTHORIZATION);

        let (canonical_headers, signed_headers) = canonical_headers(headers);
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.as_str(),
            canonical_path(uri),
            canonical_query(uri),
            canonical_headers,
            signed_headers,
            payload_sha256
        );

        let scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key = self.signing_key(&date_stamp)?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key_id, scope, signed_headers, signature
        );
        headers.insert(AUTHORIZATION, header_value(&authorization)?);

        Ok(())
    }

    fn signing_key(&self, date_stamp: &str) -> Result<Vec<u8>> {
        let secret = format!("AWS4{}", self.secret_access_key);
        let k_date = hmac_sha256(secret.as_bytes(), date_stamp.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid header value '{}': {}", value, e)))
}

fn canonical_path(uri: &Uri) -> &str {
    match uri.path() {
        "" => "/",
        path => path,
    }
}

// Query pairs are expected to be percent-encoded already
fn canonical_query(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return String::new();
    };

    let mut pairs: Vec<(&str, &str)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect();
    pairs.sort_unstable();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn canonical_headers(headers: &HeaderMap) -> (String, String) {
    let mut merged: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
        merged.entry(name.as_str()).or_default().push(collapsed);
    }

    let mut canonical = String::new();
    for (name, values) in &merged {
        canonical.push_str(name);
        canonical.push(':');
        canonical.push_str(&values.join(","));
        canonical.push('\n');
    }

    let signed = merged.keys().copied().collect::<Vec<_>>().join(";");
    (canonical, signed)
}
