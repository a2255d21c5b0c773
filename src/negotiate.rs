//! Range negotiation.
//!
//! [`negotiate`] is a pure function of the resource and the request: it
//! decides between a full response, a single byte window (`206`), or `416`,
//! and computes the headers that describe that decision. It never touches
//! the body.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use axum_extra::headers::{ContentRange, Header, HeaderValue, LastModified};
use tracing::{debug, trace};

/// The byte-addressable resource being served.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub total_size: u64,
    /// Entity tag exactly as it appears in the `ETag` header, quotes included.
    pub entity_tag: Option<String>,
    pub last_modified: Option<SystemTime>,
    pub mime_type: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(total_size: u64) -> Self {
        ResourceDescriptor { total_size, ..Default::default() }
    }

    pub fn with_entity_tag(mut self, entity_tag: impl Into<String>) -> Self {
        self.entity_tag = Some(entity_tag.into());
        self
    }

    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Range-related facts about the incoming request.
///
/// Inside axum this is usually obtained through its
/// [`FromRequestParts`](axum::extract::FromRequestParts) implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeRequest {
    /// Raw `Range` header value.
    pub range: Option<String>,
    /// Raw `If-Range` header value.
    pub if_range: Option<String>,
    pub method_is_safe: bool,
    pub protocol_is_http10: bool,
}

impl RangeRequest {
    /// A safe HTTP/1.1 request carrying the given `Range` header.
    pub fn range(range: impl Into<String>) -> Self {
        RangeRequest {
            range: Some(range.into()),
            method_is_safe: true,
            ..Default::default()
        }
    }

    pub fn with_if_range(mut self, if_range: impl Into<String>) -> Self {
        self.if_range = Some(if_range.into());
        self
    }
}

/// Which kind of response the negotiation settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeStatus {
    /// Whole resource, no partial-content signalling.
    Full,
    /// A single byte window, `206 Partial Content`.
    Partial,
    /// `416 Range Not Satisfiable`, no body.
    Unsatisfiable,
}

impl RangeStatus {
    pub fn status_code(self) -> StatusCode {
        match self {
            RangeStatus::Full => StatusCode::OK,
            RangeStatus::Partial => StatusCode::PARTIAL_CONTENT,
            RangeStatus::Unsatisfiable => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }
}

/// Length of the byte window to stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowLength {
    Bytes(u64),
    /// Everything from the offset to the end of the body, resolved against
    /// the body size when streaming starts.
    ToEnd,
}

impl WindowLength {
    /// Resolve to a byte count for a body of `size` bytes read from `offset`.
    pub fn resolve(self, size: u64, offset: u64) -> u64 {
        match self {
            WindowLength::Bytes(length) => length,
            WindowLength::ToEnd => size.saturating_sub(offset),
        }
    }
}

/// Value of the `Accept-Ranges` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptRanges {
    Bytes,
    None,
}

impl AcceptRanges {
    pub fn as_str(self) -> &'static str {
        match self {
            AcceptRanges::Bytes => "bytes",
            AcceptRanges::None => "none",
        }
    }

    pub fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

/// Outcome of [`negotiate`], consumed once by the streaming step.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeDecision {
    pub status: RangeStatus,
    pub offset: u64,
    pub length: WindowLength,
    pub content_range: Option<ContentRange>,
    /// `None` for `416`, where no byte window exists.
    pub content_length: Option<u64>,
    pub accept_ranges: AcceptRanges,
}

impl RangeDecision {
    fn full(total_size: u64, accept_ranges: AcceptRanges) -> Self {
        RangeDecision {
            status: RangeStatus::Full,
            offset: 0,
            length: WindowLength::ToEnd,
            content_range: None,
            content_length: Some(total_size),
            accept_ranges,
        }
    }

    fn unsatisfiable(total_size: u64, accept_ranges: AcceptRanges) -> Self {
        RangeDecision {
            status: RangeStatus::Unsatisfiable,
            offset: 0,
            length: WindowLength::Bytes(0),
            content_range: Some(ContentRange::unsatisfied_bytes(total_size)),
            content_length: None,
            accept_ranges,
        }
    }

    /// `start..=end` must lie inside `total_size`.
    fn partial(start: u64, end: u64, total_size: u64, accept_ranges: AcceptRanges) -> Option<Self> {
        let length = end - start + 1;
        let content_range = ContentRange::bytes(start..=end, total_size).ok()?;
        Some(RangeDecision {
            status: RangeStatus::Partial,
            offset: start,
            length: WindowLength::Bytes(length),
            content_range: Some(content_range),
            content_length: Some(length),
            accept_ranges,
        })
    }
}

/// Decide how to answer `request` for `resource`.
pub fn negotiate(resource: &ResourceDescriptor, request: &RangeRequest) -> RangeDecision {
    let total_size = resource.total_size;
    let accept_ranges = if request.method_is_safe {
        AcceptRanges::Bytes
    } else {
        AcceptRanges::None
    };
    let full = RangeDecision::full(total_size, accept_ranges);

    let Some(range) = request.range.as_deref() else {
        return full;
    };

    if let Some(if_range) = request.if_range.as_deref() {
        if !if_range_matches(resource, if_range) {
            debug!(if_range, "If-Range does not match resource validators, ignoring Range");
            return full;
        }
    }

    let Some(size) = i64::try_from(total_size).ok() else {
        debug!(total_size, "resource too large for range arithmetic");
        return full;
    };

    let Some((start, end)) = parse_range(range, size) else {
        debug!(range, "malformed Range header, serving full resource");
        return full;
    };
    trace!(range, start, end, total_size, "parsed Range header");

    if start > end {
        debug!(start, end, "range start after end, serving full resource");
        return full;
    }

    if start < 0 || end > size - 1 {
        debug!(start, end, total_size, "range not satisfiable");
        return RangeDecision::unsatisfiable(total_size, accept_ranges);
    }

    if start == 0 && end == size - 1 {
        return full;
    }

    // 0 <= start <= end < size, so both fit in u64
    let (start, end) = (start as u64, end as u64);
    match RangeDecision::partial(start, end, total_size, accept_ranges) {
        Some(decision) => {
            debug!(start, end, total_size, "serving partial content");
            decision
        }
        None => full,
    }
}

/// Resolve the first range spec of `header` to signed inclusive offsets.
///
/// Offsets are resolved literally and may lie outside `0..size`; callers
/// validate them afterwards. Returns `None` for headers that cannot be split
/// into numeric offsets.
fn parse_range(header: &str, size: i64) -> Option<(i64, i64)> {
    let specs = header.strip_prefix("bytes=")?;
    let spec = specs.split(',').next().unwrap_or_default();

    let (start, end) = match spec.split_once('-') {
        Some((start, end)) => (start.trim(), Some(end.trim())),
        None => (spec.trim(), None),
    };

    // without a separator the end offset degenerates to zero
    let end = match end {
        None => 0,
        Some("") => size - 1,
        Some(end) => parse_offset(end)?,
    };

    if start.is_empty() {
        // suffix range: `end` holds the suffix length
        Some((size - end, size - 1))
    } else {
        Some((parse_offset(start)?, end))
    }
}

fn parse_offset(value: &str) -> Option<i64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // digit runs too long for i64 saturate, landing past any resource end
    Some(value.parse().unwrap_or(i64::MAX))
}

fn if_range_matches(resource: &ResourceDescriptor, if_range: &str) -> bool {
    if resource.entity_tag.as_deref() == Some(if_range) {
        return true;
    }

    match resource.last_modified {
        Some(last_modified) => http_date(last_modified).as_deref() == Some(if_range),
        None => false,
    }
}

/// Seconds from the Unix epoch to 10000-01-01T00:00:00Z.
const YEAR_10000: u64 = 253_402_300_800;

/// Format `time` as an IMF-fixdate, e.g. `Wed, 21 Oct 2015 07:28:00 GMT`.
///
/// Sub-second precision is dropped. Returns `None` for times before the
/// Unix epoch or after the year 9999.
pub fn http_date(time: SystemTime) -> Option<String> {
    let since_epoch = time.duration_since(UNIX_EPOCH).ok()?;
    if since_epoch.as_secs() >= YEAR_10000 {
        return None;
    }
    let mut values: Vec<HeaderValue> = Vec::with_capacity(1);
    LastModified::from(time).encode(&mut values);
    values.pop()?.to_str().ok().map(str::to_owned)
}
