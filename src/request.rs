//! Extraction of [`RangeRequest`] from an incoming request.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::{IF_RANGE, RANGE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, Method, Version};

use crate::RangeRequest;

impl RangeRequest {
    /// Read the range-related parts of a request.
    ///
    /// Header values that are not visible ASCII are treated as absent.
    pub fn from_request(method: &Method, version: Version, headers: &HeaderMap) -> Self {
        RangeRequest {
            range: header_str(headers, RANGE),
            if_range: header_str(headers, IF_RANGE),
            method_is_safe: method.is_safe(),
            protocol_is_http10: version == Version::HTTP_10,
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::from_request(&parts.method, parts.version, &parts.headers)
    }
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers.get(name)?.to_str().ok().map(str::to_owned)
}

impl<S: Send + Sync> FromRequestParts<S> for RangeRequest {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(RangeRequest::from_parts(parts))
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::FromRequestParts;
    use axum::http::{HeaderValue, Method, Request, Version};

    use crate::RangeRequest;

    fn parts(method: Method, version: Version, headers: &[(&str, &[u8])]) -> axum::http::request::Parts {
        let mut builder = Request::builder().method(method).version(version);
        for (name, value) in headers {
            builder = builder.header(*name, HeaderValue::from_bytes(value).unwrap());
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_extract_range_headers() {
        let mut parts = parts(
            Method::GET,
            Version::HTTP_11,
            &[("range", b"bytes=0-99"), ("if-range", b"\"abc\"")],
        );
        let request = RangeRequest::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(
            RangeRequest {
                range: Some("bytes=0-99".to_string()),
                if_range: Some("\"abc\"".to_string()),
                method_is_safe: true,
                protocol_is_http10: false,
            },
            request
        );
    }

    #[test]
    fn test_method_and_version() {
        let request = RangeRequest::from_parts(&parts(Method::POST, Version::HTTP_10, &[]));
        assert!(!request.method_is_safe);
        assert!(request.protocol_is_http10);
        assert_eq!(None, request.range);

        let request = RangeRequest::from_parts(&parts(Method::HEAD, Version::HTTP_2, &[]));
        assert!(request.method_is_safe);
        assert!(!request.protocol_is_http10);
    }

    #[test]
    fn test_opaque_header_is_ignored() {
        let request = RangeRequest::from_parts(&parts(Method::GET, Version::HTTP_11, &[("range", b"bytes=\xff")]));
        assert_eq!(None, request.range);
    }
}
