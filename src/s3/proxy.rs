//! HTTPS proxy support
//!
//! The proxy comes from the `https.proxyHost` and `https.proxyPort` process
//! properties. When both are set the SDK client sends its requests through a
//! `reqwest` transport configured with that proxy.
//!
//! Request and response bodies are buffered in memory by this transport.

use crate::env::Environment;
use aws_smithy_runtime_api::client::http::{
    HttpClient, HttpConnector, HttpConnectorFuture, HttpConnectorSettings, SharedHttpConnector,
};
use aws_smithy_runtime_api::client::orchestrator::{HttpRequest, HttpResponse};
use aws_smithy_runtime_api::client::result::ConnectorError;
use aws_smithy_runtime_api::client::runtime_components::RuntimeComponents;
use aws_smithy_runtime_api::http::StatusCode;
use aws_smithy_types::body::SdkBody;
use std::fmt;
use tracing::debug;

/// Property naming the proxy host
pub const PROXY_HOST_PROPERTY: &str = "https.proxyHost";
/// Property naming the proxy port
pub const PROXY_PORT_PROPERTY: &str = "https.proxyPort";

/// HTTPS proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    /// Create a proxy configuration
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Proxy from process properties.
    ///
    /// Present only when both properties are set and the port is a valid
    /// port number.
    pub fn from_environment(env: &dyn Environment) -> Option<Self> {
        let host = env.property(PROXY_HOST_PROPERTY)?;
        let port = env.property(PROXY_PORT_PROPERTY)?;
        match port.parse::<u16>() {
            Ok(port) => Some(Self::new(host, port)),
            Err(_) => {
                debug!(port = %port, "Ignoring proxy with invalid port");
                None
            }
        }
    }

    /// Proxy URL
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// SDK HTTP client sending requests through a proxy
#[derive(Clone)]
pub struct ProxyHttpClient {
    client: reqwest::Client,
    proxy: ProxyConfig,
}

impl ProxyHttpClient {
    /// Create a client routing every request through `proxy`
    pub fn new(proxy: &ProxyConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(proxy.url())?)
            .build()?;

        Ok(Self {
            client,
            proxy: proxy.clone(),
        })
    }
}

impl fmt::Debug for ProxyHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHttpClient")
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

impl HttpClient for ProxyHttpClient {
    fn http_connector(
        &self,
        settings: &HttpConnectorSettings,
        _components: &RuntimeComponents,
    ) -> SharedHttpConnector {
        SharedHttpConnector::new(ProxyConnector {
            client: self.client.clone(),
            read_timeout: settings.read_timeout(),
        })
    }
}

#[derive(Debug, Clone)]
struct ProxyConnector {
    client: reqwest::Client,
    read_timeout: Option<std::time::Duration>,
}

impl HttpConnector for ProxyConnector {
    fn call(&self, request: HttpRequest) -> HttpConnectorFuture {
        let client = self.client.clone();
        let read_timeout = self.read_timeout;
        HttpConnectorFuture::new(async move { send(client, request, read_timeout).await })
    }
}

async fn send(
    client: reqwest::Client,
    request: HttpRequest,
    read_timeout: Option<std::time::Duration>,
) -> Result<HttpResponse, ConnectorError> {
    let method = reqwest::Method::from_bytes(request.method().as_bytes())
        .map_err(|e| ConnectorError::other(e.into(), None))?;

    let body = request
        .body()
        .bytes()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| ConnectorError::other("streaming request bodies are not supported".into(), None))?;

    let mut builder = client.request(method, request.uri());
    for (name, value) in request.headers().iter() {
        builder = builder.header(name, value);
    }
    if let Some(timeout) = read_timeout {
        builder = builder.timeout(timeout);
    }

    let response = builder.body(body).send().await.map_err(connector_error)?;

    let status = StatusCode::try_from(response.status().as_u16())
        .map_err(|e| ConnectorError::other(e.into(), None))?;
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let bytes = response.bytes().await.map_err(connector_error)?;

    let mut sdk_response = HttpResponse::new(status, SdkBody::from(bytes));
    for (name, value) in headers {
        sdk_response.headers_mut().append(name, value);
    }
    Ok(sdk_response)
}

fn connector_error(e: reqwest::Error) -> ConnectorError {
    if e.is_timeout() {
        ConnectorError::timeout(e.into())
    } else if e.is_connect() {
        ConnectorError::io(e.into())
    } else {
        ConnectorError::other(e.into(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MemoryEnvironment;

    #[test]
    fn test_proxy_requires_host_and_port() {
        let both = MemoryEnvironment::new()
            .with_property(PROXY_HOST_PROPERTY, "proxy.local")
            .with_property(PROXY_PORT_PROPERTY, "3128");
        assert_eq!(
            ProxyConfig::from_environment(&both),
            Some(ProxyConfig::new("proxy.local", 3128))
        );

        let host_only = MemoryEnvironment::new().with_property(PROXY_HOST_PROPERTY, "proxy.local");
        assert_eq!(ProxyConfig::from_environment(&host_only), None);

        let port_only = MemoryEnvironment::new().with_property(PROXY_PORT_PROPERTY, "3128");
        assert_eq!(ProxyConfig::from_environment(&port_only), None);
    }

    #[test]
    fn test_invalid_port_disables_proxy() {
        let env = MemoryEnvironment::new()
            .with_property(PROXY_HOST_PROPERTY, "proxy.local")
            .with_property(PROXY_PORT_PROPERTY, "not-a-port");
        assert_eq!(ProxyConfig::from_environment(&env), None);

        let too_big = MemoryEnvironment::new()
            .with_property(PROXY_HOST_PROPERTY, "proxy.local")
            .with_property(PROXY_PORT_PROPERTY, "70000");
        assert_eq!(ProxyConfig::from_environment(&too_big), None);
    }

    #[test]
    fn test_proxy_url() {
        assert_eq!(ProxyConfig::new("proxy.local", 3128).url(), "http://proxy.local:3128");
    }

    #[test]
    fn test_proxy_client_builds() {
        let client = ProxyHttpClient::new(&ProxyConfig::new("proxy.local", 3128)).unwrap();
        assert!(format!("{:?}", client).contains("proxy.local"));
    }
}
