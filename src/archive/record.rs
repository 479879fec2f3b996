//! Archive record: a HAR envelope around captured exchanges

use std::fmt::Display;
use std::time::Instant;

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE, COOKIE};
use hyper::http::response;
use hyper::{Response, StatusCode, Version};
use tracing::debug;

use serde_json::Number;

use super::format::{
    Content, Creator, Entry, EntryRequest, EntryResponse, Extensions, Har, Log, NameValue, Page,
    PostData, Timings, HAR_VERSION,
};
use super::schema;
use crate::network::is_hop_by_hop;
use crate::{Result, VcrError};

/// Declared encoding for binary-safe text fields
pub const BASE64_ENCODING: &str = "base64";

const OCTET_STREAM: &str = "application/octet-stream";

/// Request side of an exchange, collected when processing began
#[derive(Debug, Clone)]
pub struct RequestCapture {
    /// When processing of the request began
    pub started: Instant,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Absolute upstream URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Protocol version of the inbound request
    pub version: Version,
    /// Inbound headers
    pub headers: HeaderMap,
    /// Decoded query parameters
    pub query: Vec<(String, String)>,
    /// Raw request body
    pub body: Bytes,
}

/// Ordered list of captured exchanges with HAR envelope metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRecord {
    version: String,
    creator: Creator,
    pages: Vec<Page>,
    entries: Vec<Entry>,
    extensions: Extensions,
}

impl ArchiveRecord {
    /// Empty record with a synthetic page
    pub fn new() -> Self {
        Self {
            version: HAR_VERSION.to_string(),
            creator: Creator::default(),
            pages: vec![Page::synthetic(timestamp(Utc::now()))],
            entries: Vec::new(),
            extensions: Extensions::new(),
        }
    }

    /// Parse a stored envelope. A document without `log` or `entries` yields an empty record.
    ///
    /// # Errors
    ///
    /// Returns error if `raw` is not JSON or fields have the wrong shape
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let har: Har = serde_json::from_slice(raw)?;

        let Some(log) = har.log else {
            return Ok(Self::new());
        };

        let mut record = Self {
            version: log.version,
            creator: log.creator,
            pages: log.pages,
            entries: log.entries,
            extensions: log.extensions,
        };
        if record.pages.is_empty() {
            record.pages.push(Page::synthetic(timestamp(Utc::now())));
        }

        Ok(record)
    }

    /// Serialize the full envelope as pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.to_har())?)
    }

    /// HAR document view
    pub fn to_har(&self) -> Har {
        Har {
            log: Some(Log {
                version: self.version.clone(),
                creator: self.creator.clone(),
                pages: self.pages.clone(),
                entries: self.entries.clone(),
                extensions: self.extensions.clone(),
            }),
        }
    }

    /// Captured entries
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Append an entry
    pub fn push_entry(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// The entry that answers cache hits
    ///
    /// # Errors
    ///
    /// Returns `EmptyRecord` if there are no entries
    pub fn first_entry(&self) -> Result<&Entry> {
        self.entries.first().ok_or(VcrError::EmptyRecord)
    }

    /// Structural HAR check; never fails, invalid records give `false`
    pub fn validate(&self) -> bool {
        serde_json::to_value(self.to_har()).is_ok_and(|value| schema::validate_value(&value))
    }

    /// Drain `body`, append an entry describing the exchange and return the drained bytes.
    ///
    /// The body is stored base64-encoded so binary payloads survive unchanged.
    ///
    /// # Errors
    ///
    /// Returns `Upstream` if the body stream fails
    pub async fn capture_entry<B>(
        &mut self,
        request: &RequestCapture,
        response: &response::Parts,
        body: B,
    ) -> Result<Bytes>
    where
        B: hyper::body::Body,
        B::Error: Display,
    {
        let bytes = body
            .collect()
            .await
            .map_err(|e| VcrError::Upstream(format!("Failed to read response body: {e}")))?
            .to_bytes();

        let elapsed = millis(request.started.elapsed().as_secs_f64() * 1e3);
        let http_version = version_label(request.version).to_string();

        let entry = Entry {
            started_date_time: timestamp(request.started_at),
            time: elapsed.clone(),
            request: EntryRequest {
                url: request.url.clone(),
                method: request.method.clone(),
                http_version: http_version.clone(),
                cookies: cookie_pairs(&request.headers),
                headers: header_pairs(&request.headers),
                query_string: request
                    .query
                    .iter()
                    .map(|(name, value)| NameValue::new(name, value))
                    .collect(),
                post_data: post_data(&request.headers, &request.body),
                ..EntryRequest::default()
            },
            response: EntryResponse {
                status: response.status.as_u16(),
                status_text: response
                    .status
                    .canonical_reason()
                    .unwrap_or("OK")
                    .to_string(),
                http_version,
                headers: header_pairs(&response.headers),
                content: Content {
                    size: bytes.len() as i64,
                    text: Some(general_purpose::STANDARD.encode(&bytes)),
                    encoding: Some(BASE64_ENCODING.to_string()),
                    comment: Some(header_text(&response.headers, &CONTENT_ENCODING)),
                    mime_type: header_text(&response.headers, &CONTENT_TYPE),
                    ..Content::default()
                },
                ..EntryResponse::default()
            },
            timings: Timings {
                send: elapsed.clone(),
                ..Timings::default()
            },
            ..Entry::default()
        };

        debug!(
            "Captured {} {} -> {} ({} bytes, {elapsed}ms)",
            request.method,
            request.url,
            response.status,
            bytes.len()
        );

        self.entries.push(entry);
        Ok(bytes)
    }

    /// Build the reply for a cache hit from the first entry: status, headers and decoded body.
    ///
    /// # Errors
    ///
    /// Returns `EmptyRecord` if there are no entries, `InvalidFormat` if the
    /// stored status or body cannot be decoded
    pub fn reply_from_first_entry(&self) -> Result<Response<Full<Bytes>>> {
        let stored = &self.first_entry()?.response;

        let status = StatusCode::from_u16(stored.status).map_err(|e| {
            VcrError::InvalidFormat(format!("Invalid stored status {}: {e}", stored.status))
        })?;
        let body = stored.content.decoded()?;

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for pair in &stored.headers {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(pair.name.as_bytes()),
                HeaderValue::from_str(&pair.value),
            ) else {
                debug!("Skipping unrepresentable stored header '{}'", pair.name);
                continue;
            };
            if !is_hop_by_hop(&name) {
                headers.append(name, value);
            }
        }

        if !headers.contains_key(CONTENT_TYPE) && !stored.content.mime_type.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&stored.content.mime_type) {
                headers.insert(CONTENT_TYPE, value);
            }
        }

        Ok(response)
    }
}

impl Default for ArchiveRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl Content {
    /// Body bytes, decoded per `encoding`; absent text is an empty body
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the text is not valid for its encoding
    pub fn decoded(&self) -> Result<Vec<u8>> {
        decode_text(self.text.as_deref().unwrap_or_default(), self.encoding.as_deref())
    }
}

impl PostData {
    /// Body bytes, decoded per `_encoding`
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the text is not valid for its encoding
    pub fn decoded(&self) -> Result<Vec<u8>> {
        decode_text(&self.text, self.encoding.as_deref())
    }
}

fn decode_text(text: &str, encoding: Option<&str>) -> Result<Vec<u8>> {
    match encoding {
        Some(BASE64_ENCODING) => general_purpose::STANDARD
            .decode(text)
            .map_err(|e| VcrError::InvalidFormat(format!("Invalid base64 content: {e}"))),
        _ => Ok(text.as_bytes().to_vec()),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds rounded to 2 decimals
fn millis(ms: f64) -> Number {
    Number::from_f64((ms * 100.0).round() / 100.0).unwrap_or_else(|| Number::from(0))
}

/// `HTTP/1.1` style label for a protocol version
pub fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    }
}

fn header_text(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default()
}

fn header_pairs(headers: &HeaderMap) -> Vec<NameValue> {
    headers
        .iter()
        .map(|(name, value)| {
            NameValue::new(name.as_str(), String::from_utf8_lossy(value.as_bytes()))
        })
        .collect()
}

fn cookie_pairs(headers: &HeaderMap) -> Vec<NameValue> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            Some(NameValue::new(name.trim(), value.trim().trim_matches('"')))
        })
        .collect()
}

fn post_data(headers: &HeaderMap, body: &Bytes) -> Option<PostData> {
    if body.is_empty() {
        return None;
    }

    let mime_type = match header_text(headers, &CONTENT_TYPE) {
        mime if mime.is_empty() => OCTET_STREAM.to_string(),
        mime => mime,
    };

    Some(match std::str::from_utf8(body) {
        Ok(text) => PostData {
            mime_type,
            text: text.to_string(),
            ..PostData::default()
        },
        Err(_) => PostData {
            mime_type,
            text: general_purpose::STANDARD.encode(body),
            encoding: Some(BASE64_ENCODING.to_string()),
            ..PostData::default()
        },
    })
}
