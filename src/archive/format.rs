//! HAR 1.2 document model
//!
//! Field names follow the HAR specification (camelCase). Every struct is
//! lenient on input: missing fields fall back to the values a freshly
//! captured entry would carry. Fields this model does not name are kept in
//! `extensions`, and optional HAR fields stay absent when they were absent,
//! so a parsed document serializes back to the same structure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Fields kept verbatim through a parse and re-serialize
pub type Extensions = BTreeMap<String, Value>;

/// HAR format version written to every archive
pub const HAR_VERSION: &str = "1.2";

/// Id and title of the synthetic page
pub const PAGE_ID: &str = "vcr-har";

/// Placeholder for unknown sizes
pub const UNKNOWN_SIZE: i64 = -1;

/// Root of a HAR document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Har {
    /// The log; absent in structurally empty documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<Log>,
}

/// `log` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Format version
    #[serde(default = "default_version")]
    pub version: String,
    /// Producing application
    #[serde(default)]
    pub creator: Creator,
    /// Pages
    #[serde(default)]
    pub pages: Vec<Page>,
    /// Captured exchanges
    #[serde(default)]
    pub entries: Vec<Entry>,
    /// `comment` and custom fields
    #[serde(flatten)]
    pub extensions: Extensions,
}

fn default_version() -> String {
    HAR_VERSION.to_string()
}

/// `creator` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    /// Application name
    pub name: String,
    /// Application version
    pub version: String,
    /// `comment` and custom fields
    #[serde(flatten)]
    pub extensions: Extensions,
}

impl Default for Creator {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extensions: Extensions::new(),
        }
    }
}

/// `pages[]` item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Page load start, RFC 3339
    pub started_date_time: String,
    /// Page id
    pub id: String,
    /// Page title
    pub title: String,
    /// Page timings
    #[serde(default)]
    pub page_timings: Map<String, Value>,
    /// `comment` and custom fields
    #[serde(flatten)]
    pub extensions: Extensions,
}

impl Page {
    /// The single synthetic page every archive carries
    pub fn synthetic(started_date_time: String) -> Self {
        Self {
            started_date_time,
            id: PAGE_ID.to_string(),
            title: PAGE_ID.to_string(),
            page_timings: Map::new(),
            extensions: Extensions::new(),
        }
    }
}

/// `entries[]` item: one request/response exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Entry {
    /// Request start, RFC 3339
    pub started_date_time: String,
    /// Total elapsed time in milliseconds
    pub time: Number,
    /// Captured request
    pub request: EntryRequest,
    /// Captured response
    pub response: EntryResponse,
    /// Timing breakdown
    pub timings: Timings,
    /// Cache info
    pub cache: Map<String, Value>,
    /// `pageref`, `serverIPAddress`, `connection`, `comment` and custom fields
    #[serde(flatten)]
    pub extensions: Extensions,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            started_date_time: String::new(),
            time: Number::from(0),
            request: EntryRequest::default(),
            response: EntryResponse::default(),
            timings: Timings::default(),
            cache: Map::new(),
            extensions: Extensions::new(),
        }
    }
}

/// Name/value pair used for headers, cookies and query strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    /// Name
    pub name: String,
    /// Value
    pub value: String,
    /// Cookie attributes, `comment` and custom fields
    #[serde(flatten)]
    pub extensions: Extensions,
}

impl NameValue {
    /// Create a pair
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            extensions: Extensions::new(),
        }
    }
}

/// `request` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryRequest {
    /// Absolute upstream URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Protocol version, e.g. `HTTP/1.1`
    pub http_version: String,
    /// Request cookies
    pub cookies: Vec<NameValue>,
    /// Request headers
    pub headers: Vec<NameValue>,
    /// Decoded query parameters
    pub query_string: Vec<NameValue>,
    /// Header block size
    pub headers_size: i64,
    /// Body size
    pub body_size: i64,
    /// Request body, when one was sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_data: Option<PostData>,
    /// `comment` and custom fields
    #[serde(flatten)]
    pub extensions: Extensions,
}

impl Default for EntryRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: "GET".to_string(),
            http_version: "HTTP/1.1".to_string(),
            cookies: Vec::new(),
            headers: Vec::new(),
            query_string: Vec::new(),
            headers_size: UNKNOWN_SIZE,
            body_size: UNKNOWN_SIZE,
            post_data: None,
            extensions: Extensions::new(),
        }
    }
}

/// `postData` object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostData {
    /// Body content type
    #[serde(default)]
    pub mime_type: String,
    /// Body text, base64 when `encoding` says so
    #[serde(default)]
    pub text: String,
    /// `base64` for bodies that are not valid UTF-8
    #[serde(rename = "_encoding", default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// `params`, `comment` and custom fields
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// `response` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryResponse {
    /// Status code
    pub status: u16,
    /// Reason phrase
    pub status_text: String,
    /// Protocol version
    pub http_version: String,
    /// Response cookies
    pub cookies: Vec<NameValue>,
    /// Response headers
    pub headers: Vec<NameValue>,
    /// Response body
    pub content: Content,
    /// Redirect target
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    /// Header block size
    pub headers_size: i64,
    /// Body size
    pub body_size: i64,
    /// `comment` and custom fields
    #[serde(flatten)]
    pub extensions: Extensions,
}

impl Default for EntryResponse {
    fn default() -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            http_version: "HTTP/1.1".to_string(),
            cookies: Vec::new(),
            headers: Vec::new(),
            content: Content::default(),
            redirect_url: String::new(),
            headers_size: UNKNOWN_SIZE,
            body_size: UNKNOWN_SIZE,
            extensions: Extensions::new(),
        }
    }
}

/// `content` object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Content {
    /// Decoded body length in bytes
    pub size: i64,
    /// Body text, encoded per `encoding`; absent when the body was not kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// `base64`, or absent for plain text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Upstream `content-encoding`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Upstream `content-type`
    pub mime_type: String,
    /// `compression` and custom fields
    #[serde(flatten)]
    pub extensions: Extensions,
}

/// `timings` object, milliseconds, -1 when not applicable.
///
/// Values are kept as JSON numbers so integer timings stay integers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Queue time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<Number>,
    /// DNS resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Number>,
    /// Connection setup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<Number>,
    /// Request send time
    pub send: Number,
    /// Time to first byte
    pub wait: Number,
    /// Response read time
    pub receive: Number,
    /// `ssl`, `comment` and custom fields
    #[serde(flatten)]
    pub extensions: Extensions,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            blocked: Some(Number::from(-1)),
            dns: Some(Number::from(-1)),
            connect: Some(Number::from(-1)),
            send: Number::from(0),
            wait: Number::from(0),
            receive: Number::from(0),
            extensions: Extensions::new(),
        }
    }
}
