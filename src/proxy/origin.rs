//! Origin URL parsing and path rewriting

use std::fmt;

use hyper::Uri;

use crate::{Result, VcrError};

/// Parsed origin base URL: scheme, authority and optional base path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    scheme: String,
    authority: String,
    base_path: String,
}

/// Upstream path and raw query for one inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    /// Base path joined with the inbound path, separators collapsed
    pub path: String,
    /// Inbound query string, verbatim
    pub query: Option<String>,
}

impl Origin {
    /// Parse `http(s)://authority[/base]`
    ///
    /// # Errors
    ///
    /// Returns `InvalidOrigin` for anything else
    pub fn parse(raw: &str) -> Result<Self> {
        let uri: Uri = raw
            .trim()
            .parse()
            .map_err(|e| VcrError::InvalidOrigin(format!("{raw}: {e}")))?;

        let scheme = match uri.scheme_str() {
            Some(scheme @ ("http" | "https")) => scheme.to_string(),
            _ => {
                return Err(VcrError::InvalidOrigin(format!(
                    "{raw}: scheme must be http or https"
                )))
            }
        };

        let authority = uri
            .authority()
            .ok_or_else(|| VcrError::InvalidOrigin(format!("{raw}: missing host")))?;
        let host = authority.host().to_ascii_lowercase();
        let default_port = if scheme == "https" { 443 } else { 80 };
        let authority = match authority.port_u16() {
            Some(port) if port != default_port => format!("{host}:{port}"),
            _ => host,
        };

        Ok(Self {
            scheme,
            authority,
            base_path: uri.path().trim_end_matches('/').to_string(),
        })
    }

    /// `http` or `https`
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// `host[:port]`, default ports omitted
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Base path without trailing slash, empty for the root
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Map an inbound `path?query` onto the origin
    pub fn rewrite(&self, path_and_query: &str) -> UpstreamTarget {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path_and_query, None),
        };

        UpstreamTarget {
            path: collapse_separators(&format!("{}/{path}", self.base_path)),
            query,
        }
    }

    /// Absolute upstream URL for a rewritten target
    pub fn url(&self, target: &UpstreamTarget) -> String {
        match &target.query {
            Some(query) => format!("{self}{}?{query}", target.path),
            None => format!("{self}{}", target.path),
        }
    }

    /// Whether `path` lies under the base path
    pub fn owns_path(&self, path: &str) -> bool {
        match path.strip_prefix(self.base_path.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || self.base_path.is_empty(),
            None => false,
        }
    }

    /// Inverse of the base-path join: the inbound path that rewrites to `path`
    pub fn strip_base_path<'a>(&self, path: &'a str) -> &'a str {
        if self.base_path.is_empty() {
            return path;
        }
        match path.strip_prefix(self.base_path.as_str()) {
            Some("") => "/",
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

fn collapse_separators(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}
