//! Request signatures for content-addressed storage
//!
//! A request is reduced to a canonical form (method, ASCII host and path,
//! body digest, sorted and filtered query/header pairs) which is then hashed
//! with SHA-256. The hex digest names the archive file that stores the
//! response, under a `<host>/<path>/` directory.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::ServerOptions;
use crate::storage::RECORD_EXTENSION;

/// Headers that never take part in a signature
pub const DEFAULT_IGNORE_HEADERS: [&str; 2] = ["host", "user-agent"];

/// Request as seen by the signature engine
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: String,
    /// Origin host (authority)
    pub host: String,
    /// Request path, without query string
    pub path: String,
    /// Query parameters, names may repeat
    pub query: Vec<(String, Value)>,
    /// Header fields
    pub headers: Vec<(String, Value)>,
    /// Raw request body
    pub body: Vec<u8>,
}

impl RequestDescriptor {
    /// Create a descriptor with no query, headers or body
    pub fn new(method: impl Into<String>, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            host: host.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Add a query parameter
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add a header field
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Names dropped from the canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureOptions {
    ignore_headers: BTreeSet<String>,
    ignore_query_parameters: BTreeSet<String>,
}

impl SignatureOptions {
    /// Build options from ignore lists; `host` and `user-agent` are always ignored
    pub fn new<H, Q>(ignore_headers: H, ignore_query_parameters: Q) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        Q: IntoIterator,
        Q::Item: AsRef<str>,
    {
        let ignore_headers = DEFAULT_IGNORE_HEADERS
            .iter()
            .map(|name| (*name).to_string())
            .chain(ignore_headers.into_iter().map(|n| normalize_name(n.as_ref())))
            .collect();
        let ignore_query_parameters = ignore_query_parameters
            .into_iter()
            .map(|n| normalize_name(n.as_ref()))
            .collect();

        Self {
            ignore_headers,
            ignore_query_parameters,
        }
    }

    /// Options from a server's configuration
    pub fn from_server(options: &ServerOptions) -> Self {
        Self::new(&options.ignore_headers, &options.ignore_query_parameters)
    }

    /// Whether a header name is ignored
    pub fn ignores_header(&self, name: &str) -> bool {
        self.ignore_headers.contains(&normalize_name(name))
    }

    /// Whether a query parameter name is ignored
    pub fn ignores_query_parameter(&self, name: &str) -> bool {
        self.ignore_query_parameters.contains(&normalize_name(name))
    }
}

impl Default for SignatureOptions {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>(), std::iter::empty::<&str>())
    }
}

/// Sanitized `{name, value}` pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Pair {
    /// Normalized, lowercased name
    pub name: String,
    /// Canonical string value
    pub value: String,
}

/// Canonical form of a request, the input to the hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalRequest {
    /// Uppercased method
    pub method: String,
    /// ASCII, lowercased host
    pub host: String,
    /// ASCII, lowercased path
    pub pathname: String,
    /// Hex SHA-256 of the raw body
    pub body: String,
    /// Filtered, sorted query pairs
    pub query: Vec<Pair>,
    /// Filtered, sorted header pairs
    pub headers: Vec<Pair>,
}

impl CanonicalRequest {
    /// Canonicalize a request descriptor
    pub fn new(descriptor: &RequestDescriptor, options: &SignatureOptions) -> Self {
        Self {
            method: descriptor.method.to_uppercase(),
            host: host_key(&descriptor.host),
            pathname: to_ascii(&descriptor.path).to_lowercase(),
            body: hex::encode(Sha256::digest(&descriptor.body)),
            query: sanitize_pairs(&descriptor.query, &options.ignore_query_parameters),
            headers: sanitize_pairs(&descriptor.headers, &options.ignore_headers),
        }
    }
}

/// Hex SHA-256 digest identifying a request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(String);

impl Signature {
    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical request together with its signature
#[derive(Debug, Clone)]
pub struct Fingerprint {
    canonical: CanonicalRequest,
    signature: Signature,
}

impl Fingerprint {
    /// Canonicalize and hash a request
    pub fn compute(descriptor: &RequestDescriptor, options: &SignatureOptions) -> Self {
        let canonical = CanonicalRequest::new(descriptor, options);
        let signature = hash_canonical(&canonical);
        Self {
            canonical,
            signature,
        }
    }

    /// Canonical form
    pub fn canonical(&self) -> &CanonicalRequest {
        &self.canonical
    }

    /// Signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Store key relative to the storage root
    pub fn record_key(&self) -> PathBuf {
        record_key(&self.canonical, &self.signature)
    }

    /// Absolute storage path under `root`
    pub fn storage_path(&self, root: &Path) -> PathBuf {
        storage_path(root, &self.canonical, &self.signature)
    }
}

/// Compute the signature of a request
pub fn compute_signature(descriptor: &RequestDescriptor, options: &SignatureOptions) -> Signature {
    hash_canonical(&CanonicalRequest::new(descriptor, options))
}

/// `<root>/<host>/<path>/<signature>.har`
pub fn storage_path(root: &Path, canonical: &CanonicalRequest, signature: &Signature) -> PathBuf {
    root.join(record_key(canonical, signature))
}

/// `<host>/<path>/<signature>.har`, relative to the storage root.
///
/// Empty, `.` and `..` path segments are dropped so the key stays below the root.
pub fn record_key(canonical: &CanonicalRequest, signature: &Signature) -> PathBuf {
    let mut key = PathBuf::new();
    push_segments(&mut key, &canonical.host);
    push_segments(&mut key, &canonical.pathname);
    key.push(format!("{signature}.{RECORD_EXTENSION}"));
    key
}

/// Directory name used for an origin host
pub fn host_key(host: &str) -> String {
    to_ascii(host).to_lowercase()
}

/// Encode non-ASCII dot-separated labels as punycode (`xn--`), leaving ASCII labels untouched
pub fn to_ascii(input: &str) -> String {
    if input.is_ascii() {
        return input.to_string();
    }

    input
        .replace(&['\u{3002}', '\u{ff0e}', '\u{ff61}'][..], ".")
        .split('.')
        .map(|label| {
            if label.chars().all(|c| c <= '\u{7e}') {
                return label.to_string();
            }
            match idna::punycode::encode_str(label) {
                Some(encoded) => format!("xn--{encoded}"),
                None => label.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn hash_canonical(canonical: &CanonicalRequest) -> Signature {
    // Serializing plain strings and vectors cannot fail
    let encoded = serde_json::to_vec(canonical).unwrap_or_default();
    Signature(hex::encode(Sha256::digest(&encoded)))
}

fn normalize_name(name: &str) -> String {
    to_ascii(name).to_lowercase()
}

fn canonical_value(value: &Value) -> String {
    match value {
        Value::String(s) => to_ascii(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn sanitize_pairs(fields: &[(String, Value)], ignored: &BTreeSet<String>) -> Vec<Pair> {
    let mut pairs: Vec<Pair> = fields
        .iter()
        .filter_map(|(name, value)| {
            let name = normalize_name(name);
            if ignored.contains(&name) {
                return None;
            }
            Some(Pair {
                name,
                value: canonical_value(value),
            })
        })
        .collect();

    pairs.sort();
    pairs
}

fn push_segments(key: &mut PathBuf, raw: &str) {
    for segment in raw.split('/') {
        match Path::new(segment).components().next() {
            Some(Component::Normal(_)) if !segment.contains('\\') => key.push(segment),
            _ => {}
        }
    }
}
