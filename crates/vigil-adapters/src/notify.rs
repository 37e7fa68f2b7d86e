//! Notification sinks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use http::Uri;
use http_body_util::Full;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info, warn};

use vigil_core::{Alert, NotificationSink, Severity};

/// Writes every alert to the log at a level matching its severity.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        let service = alert.service.as_deref().unwrap_or("-");
        let details = serde_json::Value::Object(alert.details.clone());
        match alert.severity {
            Severity::Info => info!(title = %alert.title, %service, %details, "alert"),
            Severity::Warning => warn!(title = %alert.title, %service, %details, "alert"),
            Severity::High | Severity::Critical => {
                error!(title = %alert.title, severity = ?alert.severity, %service, %details, "alert")
            }
        }
        Ok(())
    }
}

/// POSTs the alert as JSON to an `http://` or `https://` endpoint.
#[derive(Clone)]
pub struct WebhookNotifier {
    uri: Uri,
    authority: String,
    tls: Option<TlsConnector>,
    timeout: Duration,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("uri", &self.uri)
            .field("tls", &self.tls.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Client config trusting the Mozilla root store.
fn tls_connector() -> anyhow::Result<TlsConnector> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .context("tls protocol version error")?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let uri: Uri = url.parse().with_context(|| format!("invalid webhook url: {url}"))?;
        let (default_port, tls) = match uri.scheme_str() {
            Some("http") => (80, None),
            Some("https") => (443, Some(tls_connector()?)),
            Some(other) => bail!("unsupported webhook scheme `{other}`"),
            None => bail!("webhook url must be absolute: {url}"),
        };
        let Some(authority) = uri.authority() else {
            bail!("webhook url has no host: {url}");
        };
        let authority = match authority.port_u16() {
            Some(_) => authority.to_string(),
            None => format!("{}:{default_port}", authority.host()),
        };
        Ok(Self {
            uri,
            authority,
            tls,
            timeout,
        })
    }

    fn request(&self, body: Vec<u8>) -> anyhow::Result<http::Request<Full<Bytes>>> {
        let host = self
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_default();
        let path = self
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        Ok(http::Request::builder()
            .method("POST")
            .uri(path)
            .header("host", host)
            .header("content-type", "application/json")
            .header("user-agent", concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .body(Full::new(Bytes::from(body)))?)
    }

    async fn post(&self, body: Vec<u8>) -> anyhow::Result<http::StatusCode> {
        let req = self.request(body)?;
        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .with_context(|| format!("failed to connect to {}", self.authority))?;
        match &self.tls {
            None => send(stream, req).await,
            Some(connector) => {
                let host = self.uri.host().unwrap_or_default();
                let server_name = ServerName::try_from(host)
                    .with_context(|| format!("invalid tls server name in {}", self.uri))?
                    .to_owned();
                let stream = connector
                    .connect(server_name, stream)
                    .await
                    .context("webhook tls handshake failed")?;
                send(stream, req).await
            }
        }
    }
}

async fn send<S>(stream: S, req: http::Request<Full<Bytes>>) -> anyhow::Result<http::StatusCode>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .context("webhook handshake failed")?;
    tokio::spawn(async move {
        let _ = conn.await;
    });
    let resp = sender.send_request(req).await.context("webhook request failed")?;
    Ok(resp.status())
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        let body = serde_json::to_vec(alert)?;
        let status = tokio::time::timeout(self.timeout, self.post(body))
            .await
            .with_context(|| format!("webhook timed out after {:?}", self.timeout))??;
        if !status.is_success() {
            bail!("webhook {} returned {status}", self.uri);
        }
        debug!(uri = %self.uri, title = %alert.title, "alert delivered to webhook");
        Ok(())
    }
}

/// Delivers to every sink concurrently; fails if any sink failed.
#[derive(Clone, Default)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for FanoutNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        let outcomes = join_all(self.sinks.iter().map(|s| s.notify(alert))).await;
        let failures: Vec<String> = outcomes
            .into_iter()
            .filter_map(|r| r.err().map(|e| format!("{e:#}")))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            bail!("{} of {} sinks failed: {}", failures.len(), self.sinks.len(), failures.join("; "))
        }
    }
}
