//! Content Hash Module
//!
//! Content-MD5 values in the form S3 expects: base64 of the 128-bit MD5 digest.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crate::{ProxyError, Result};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};

pub const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

/// Base64-encoded MD5 of `body`
pub fn content_md5(body: &[u8]) -> String {
    STANDARD.encode(md5::compute(body).0)
}

/// Content-MD5 for a stored object: the origin's value when it sent one,
/// otherwise the digest of exactly the body returned to the caller.
pub fn content_md5_for(origin_headers: &HeaderMap, body: &[u8]) -> Result<HeaderValue> {
    if let Some(value) = origin_headers.get(CONTENT_MD5) {
        return Ok(value.clone());
    }

    HeaderValue::from_str(&content_md5(body))
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid Content-MD5 value: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        // md5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
        // md5("ok") = 444bcb3a3fcf8389296c49467f27e1d6
        assert_eq!(content_md5(b"ok"), "REvLOj/Pg4kpbElGfyfh1g==");
    }

    #[test]
    fn test_origin_digest_is_passed_through() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_MD5,
            HeaderValue::from_static("not-what-we-would-compute"),
        );
        let value = content_md5_for(&headers, b"ok").unwrap();
        assert_eq!(value, "not-what-we-would-compute");
    }

    #[test]
    fn test_digest_computed_when_absent() {
        let value = content_md5_for(&HeaderMap::new(), b"ok").unwrap();
        assert_eq!(value, "REvLOj/Pg4kpbElGfyfh1g==");
    }
}
