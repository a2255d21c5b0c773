//! The responder that ties negotiation and streaming together.

use std::path::Path;
use std::time::SystemTime;

use axum::body::Body;
use axum::http::header::{
    ACCEPT_RANGES, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Version};
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{HeaderMapExt, LastModified};
use bytes::Bytes;
use tokio::fs::File;
use tracing::debug;

use crate::config::{ResponseConfig, DEFAULT_CONTENT_TYPE};
use crate::error::{Error, Result};
use crate::negotiate::http_date;
use crate::{negotiate, KnownSize, RangeBody, RangeDecision, RangeRequest, RangeStatus, RangedStream, ResourceDescriptor};

/// A response streaming a [`RangeBody`], honouring `Range` and `If-Range`.
/// Implements [`IntoResponse`].
///
/// The status and headers set by the caller are kept. Range handling only
/// applies while the status is in the 2xx class; any other status is sent
/// with the caller's headers and an empty body.
#[derive(Debug)]
pub struct StreamResponse<B> {
    body: B,
    resource: ResourceDescriptor,
    request: RangeRequest,
    status: StatusCode,
    headers: HeaderMap,
    config: ResponseConfig,
}

impl<B: RangeBody + Send + 'static> StreamResponse<B> {
    pub fn new(body: B, request: RangeRequest) -> Self {
        let resource = ResourceDescriptor::new(body.byte_size());
        StreamResponse {
            body,
            resource,
            request,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            config: ResponseConfig::default(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.resource.mime_type = Some(mime_type.into());
        self
    }

    /// Entity tag as sent in `ETag`, quotes included.
    pub fn with_entity_tag(mut self, entity_tag: impl Into<String>) -> Self {
        self.resource.entity_tag = Some(entity_tag.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.resource.last_modified = Some(last_modified);
        self
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set a response header. Headers set here take precedence over the
    /// defaults for `Accept-Ranges`, `Content-Type`, `Cache-Control`, `ETag`
    /// and `Last-Modified`.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the response configuration, rejecting invalid values.
    pub fn with_config(mut self, config: ResponseConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// The body of a stream response is always the stream; passing content
    /// is rejected.
    pub fn set_content(&mut self, content: Option<Bytes>) -> Result<()> {
        match content {
            Some(_) => Err(Error::ContentNotSettable),
            None => Ok(()),
        }
    }

    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    /// Give the body back without sending it.
    pub fn into_body(self) -> B {
        self.body
    }

    /// The range decision this response will be sent with, or `None` when
    /// the status bypasses range handling.
    pub fn decision(&self) -> Option<RangeDecision> {
        self.status
            .is_success()
            .then(|| negotiate(&self.validators(), &self.request))
    }

    /// The descriptor `If-Range` is checked against. `ETag` and
    /// `Last-Modified` headers set by the caller override the descriptor.
    fn validators(&self) -> ResourceDescriptor {
        let mut resource = self.resource.clone();
        if let Some(etag) = self.headers.get(ETAG).and_then(|value| value.to_str().ok()) {
            resource.entity_tag = Some(etag.to_owned());
        }
        if let Some(last_modified) = self.headers.typed_get::<LastModified>() {
            resource.last_modified = Some(SystemTime::from(last_modified));
        }
        resource
    }
}

impl StreamResponse<KnownSize<File>> {
    /// Open a file, taking its size and modification time from metadata and
    /// guessing its MIME type from the extension.
    pub async fn open(path: impl AsRef<Path>, request: RangeRequest) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        let metadata = file.metadata().await?;
        let body = KnownSize::sized(file, metadata.len());

        let mut response = StreamResponse::new(body, request);
        response.resource.last_modified = metadata.modified().ok();
        response.resource.mime_type = mime_guess::from_path(path).first_raw().map(str::to_owned);
        Ok(response)
    }
}

impl<B: RangeBody + Send + 'static> IntoResponse for StreamResponse<B> {
    fn into_response(self) -> Response {
        let decision = self.decision();
        let StreamResponse { body, resource, request, status, headers, config } = self;

        let mut response = Response::new(Body::empty());
        *response.version_mut() = if request.protocol_is_http10 {
            Version::HTTP_10
        } else {
            Version::HTTP_11
        };
        response.headers_mut().extend(headers);

        let Some(decision) = decision else {
            debug!(%status, "status bypasses range handling");
            *response.status_mut() = status;
            return response;
        };

        let head = response.headers_mut();
        head.entry(CONTENT_TYPE).or_insert_with(|| content_type(&resource, &config));
        head.entry(ACCEPT_RANGES).or_insert_with(|| decision.accept_ranges.header_value());
        if config.public {
            head.entry(CACHE_CONTROL).or_insert(HeaderValue::from_static("public"));
        }
        if let Some(etag) = resource.entity_tag.as_deref().and_then(|tag| HeaderValue::from_str(tag).ok()) {
            head.entry(ETAG).or_insert(etag);
        }
        if let Some(date) = resource.last_modified.and_then(http_date).and_then(|date| HeaderValue::from_str(&date).ok()) {
            head.entry(LAST_MODIFIED).or_insert(date);
        }

        match decision.content_length {
            Some(length) => { head.insert(CONTENT_LENGTH, HeaderValue::from(length)); }
            None => { head.remove(CONTENT_LENGTH); }
        }
        head.remove(CONTENT_RANGE);
        if let Some(content_range) = decision.content_range.clone() {
            head.typed_insert(content_range);
        }

        *response.status_mut() = match decision.status {
            RangeStatus::Full => status,
            other => other.status_code(),
        };

        if decision.status != RangeStatus::Unsatisfiable {
            let stream = RangedStream::for_decision(body, &decision, config.buffer_size);
            *response.body_mut() = Body::new(stream);
        }

        response
    }
}

fn content_type(resource: &ResourceDescriptor, config: &ResponseConfig) -> HeaderValue {
    resource
        .mime_type
        .as_deref()
        .and_then(|mime| HeaderValue::from_str(mime).ok())
        .or_else(|| HeaderValue::from_str(&config.default_content_type).ok())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE))
}
