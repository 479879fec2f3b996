//! Rebuilding the original request from a stored record

use std::net::SocketAddr;

use hyper::header::HeaderName;
use hyper::Uri;

use crate::archive::ArchiveRecord;
use crate::network::is_hop_by_hop;
use crate::proxy::Origin;
use crate::{Result, VcrError};

/// Request recovered from the first entry of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRequest {
    /// HTTP method
    pub method: String,
    /// Inbound path, origin base path removed, with the stored query
    pub path_and_query: String,
    /// Stored request headers minus `host` and hop-by-hop headers
    pub headers: Vec<(String, String)>,
    /// Decoded request body
    pub body: Vec<u8>,
}

impl ReplayRequest {
    /// Reconstruct the request that produced `record`
    ///
    /// # Errors
    ///
    /// Returns error if the record is empty or its URL or body cannot be decoded
    pub fn from_record(record: &ArchiveRecord, origin: &Origin) -> Result<Self> {
        let request = &record.first_entry()?.request;

        let uri: Uri = request.url.parse().map_err(|e| {
            VcrError::InvalidFormat(format!("Invalid stored URL '{}': {e}", request.url))
        })?;
        let path = origin.strip_base_path(uri.path());
        let path_and_query = match uri.query() {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };

        let headers = request
            .headers
            .iter()
            .filter(|pair| {
                HeaderName::from_bytes(pair.name.as_bytes())
                    .is_ok_and(|name| name != hyper::header::HOST && !is_hop_by_hop(&name))
            })
            .map(|pair| (pair.name.clone(), pair.value.clone()))
            .collect();

        let body = match &request.post_data {
            Some(post) => post.decoded()?,
            None => Vec::new(),
        };

        Ok(Self {
            method: request.method.clone(),
            path_and_query,
            headers,
            body,
        })
    }

    /// URL of this request on a local proxy listening at `addr`
    pub fn url(&self, addr: SocketAddr) -> String {
        format!("http://{addr}{}", self.path_and_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(url: &str) -> ArchiveRecord {
        let raw = json!({
            "log": {
                "entries": [{
                    "request": {
                        "method": "PUT",
                        "url": url,
                        "headers": [
                            {"name": "Host", "value": "localhost:5678"},
                            {"name": "connection", "value": "keep-alive"},
                            {"name": "authorization", "value": "Bearer X"}
                        ],
                        "postData": {
                            "mimeType": "application/octet-stream",
                            "text": "AP8=",
                            "_encoding": "base64"
                        }
                    }
                }]
            }
        });
        ArchiveRecord::from_bytes(raw.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_from_record_strips_base_path() {
        let origin = Origin::parse("https://example.com/v1").unwrap();
        let request =
            ReplayRequest::from_record(&record("https://example.com/v1/users?limit=10"), &origin)
                .unwrap();

        assert_eq!(request.method, "PUT");
        assert_eq!(request.path_and_query, "/users?limit=10");
        assert_eq!(
            request.headers,
            vec![("authorization".to_string(), "Bearer X".to_string())]
        );
        assert_eq!(request.body, vec![0x00, 0xff]);
        assert_eq!(
            request.url("127.0.0.1:4000".parse().unwrap()),
            "http://127.0.0.1:4000/users?limit=10"
        );
    }

    #[test]
    fn test_from_empty_record_fails() {
        let origin = Origin::parse("https://example.com").unwrap();
        let result = ReplayRequest::from_record(&ArchiveRecord::new(), &origin);
        assert!(matches!(result, Err(VcrError::EmptyRecord)));
    }
}
