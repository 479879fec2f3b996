//! HTTP(S) client for forwarding requests to origins

use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, Request, Response, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::{Result, VcrError};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Install the ring crypto provider for rustls unless one is already set
///
/// # Errors
///
/// Returns error if no provider could be installed
pub fn ensure_crypto_provider() -> Result<()> {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return Ok(());
    }

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err(VcrError::Other(
            "Failed to install rustls crypto provider".to_string(),
        ));
    }
    Ok(())
}

/// Pooled client for `http` and `https` origins
#[derive(Clone)]
pub struct UpstreamClient {
    client: HttpsClient,
}

impl UpstreamClient {
    /// Create a client trusting the platform's native roots. Plain `http`
    /// origins keep working when no roots can be loaded.
    ///
    /// # Errors
    ///
    /// Returns error if no crypto provider can be installed
    pub fn new() -> Result<Self> {
        ensure_crypto_provider()?;

        let builder = match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                warn!("No native TLS roots ({e}), https origins will fail verification");
                HttpsConnectorBuilder::new().with_tls_config(
                    rustls::ClientConfig::builder()
                        .with_root_certificates(rustls::RootCertStore::empty())
                        .with_no_client_auth(),
                )
            }
        };

        let connector = builder
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(connector);

        Ok(Self { client })
    }

    /// Send a request and return the streaming response
    ///
    /// # Errors
    ///
    /// Returns `Upstream` on transport failure
    pub async fn send(&self, request: Request<Full<Bytes>>) -> Result<Response<Incoming>> {
        let uri = request.uri().clone();
        debug!("Forwarding {} to {uri}", request.method());

        self.client.request(request).await.map_err(|e| {
            warn!("Request to {uri} failed: {e}");
            VcrError::Upstream(format!("{uri}: {e}"))
        })
    }

    /// Build and send a [`ForwardRequest`]
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be built or the transport fails
    pub async fn forward(&self, request: &ForwardRequest<'_>) -> Result<Response<Incoming>> {
        self.send(request.to_request()?).await
    }
}

/// Request described by borrowed parts
#[derive(Debug)]
pub struct ForwardRequest<'a> {
    /// HTTP method
    pub method: &'a str,
    /// Absolute URL
    pub url: &'a str,
    /// Request headers
    pub headers: &'a [(String, String)],
    /// Request body
    pub body: &'a [u8],
}

impl ForwardRequest<'_> {
    /// Build a hyper request; headers that are not valid HTTP are skipped
    ///
    /// # Errors
    ///
    /// Returns error if the method or URL is invalid
    pub fn to_request(&self) -> Result<Request<Full<Bytes>>> {
        let method = self.method.parse::<Method>().map_err(|e| {
            VcrError::InvalidFormat(format!("Invalid HTTP method '{}': {e}", self.method))
        })?;
        let uri = self
            .url
            .parse::<Uri>()
            .map_err(|e| VcrError::InvalidFormat(format!("Invalid URI '{}': {e}", self.url)))?;

        let mut request = Request::new(Full::new(Bytes::copy_from_slice(self.body)));
        *request.method_mut() = method;
        *request.uri_mut() = uri;

        let headers = request.headers_mut();
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => debug!("Skipping invalid header '{name}'"),
            }
        }

        Ok(request)
    }
}
