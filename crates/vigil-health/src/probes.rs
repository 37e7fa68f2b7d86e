//! Built-in probes for dependencies configured in `vigil.toml`.
//!
//! Timeouts are enforced by the engine, not here.

use std::process::Stdio;

use async_trait::async_trait;
use tracing::debug;

use vigil_core::Details;

use crate::probe::{Probe, ProbeError, ProbeResult};

/// HTTP GET against `http://{address}{path}`; any 2xx is healthy.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    address: String,
    path: String,
}

impl HttpProbe {
    pub fn new(address: &str, path: &str) -> Self {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Self {
            address: address.to_string(),
            path,
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self) -> ProbeResult {
        let address = self.address.as_str();
        let uri = format!("http://{address}{}", self.path);

        let stream = tokio::net::TcpStream::connect(address).await.map_err(|e| {
            debug!(error = %e, %uri, "health probe connection failed");
            ProbeError::Unreachable(e.to_string())
        })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| {
                debug!(error = %e, %uri, "health probe handshake failed");
                ProbeError::Unreachable(e.to_string())
            })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", concat!("vigil-health/", env!("CARGO_PKG_VERSION")))
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| ProbeError::Failed(e.to_string()))?;

        let resp = sender.send_request(req).await.map_err(|e| {
            debug!(error = %e, %uri, "health probe request failed");
            ProbeError::Unreachable(e.to_string())
        })?;

        let status = resp.status();
        if status.is_success() {
            let mut details = Details::new();
            details.insert("statusCode".to_string(), status.as_u16().into());
            Ok(details)
        } else if status == http::StatusCode::UNAUTHORIZED || status == http::StatusCode::FORBIDDEN {
            Err(ProbeError::Auth(format!("{uri} returned {status}")))
        } else {
            debug!(%status, %uri, "health probe non-2xx");
            Err(ProbeError::Failed(format!("{uri} returned {status}")))
        }
    }
}

/// Plain TCP connect; healthy when the port accepts.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
}

impl TcpProbe {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
        }
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self) -> ProbeResult {
        tokio::net::TcpStream::connect(&self.address)
            .await
            .map(|_| Details::new())
            .map_err(|e| ProbeError::Unreachable(e.to_string()))
    }
}

/// Shell command; healthy on exit status zero.
///
/// The child is killed if the probe is aborted on timeout.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    command: String,
}

impl CommandProbe {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }
}

#[async_trait]
impl Probe for CommandProbe {
    async fn probe(&self) -> ProbeResult {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Failed(format!("failed to spawn probe command: {e}")))?;

        if output.status.success() {
            return Ok(Details::new());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let code = output.status.code().unwrap_or(-1);
        Err(ProbeError::Failed(if stderr.is_empty() {
            format!("probe command exited with status {code}")
        } else {
            format!("probe command exited with status {code}: {stderr}")
        }))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serve one canned HTTP response and return the listener address.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn http_probe_healthy_on_2xx() {
        let addr = serve_once("HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n").await;
        let details = HttpProbe::new(&addr, "/health").probe().await.unwrap();
        assert_eq!(details["statusCode"], 200);
    }

    #[tokio::test]
    async fn http_probe_maps_401_to_auth() {
        let addr = serve_once("HTTP/1.1 401 Unauthorized\r\ncontent-length: 0\r\n\r\n").await;
        let err = HttpProbe::new(&addr, "health").probe().await.unwrap_err();
        assert!(matches!(err, ProbeError::Auth(_)));
    }

    #[tokio::test]
    async fn http_probe_fails_on_5xx() {
        let addr =
            serve_once("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n").await;
        let err = HttpProbe::new(&addr, "/health").probe().await.unwrap_err();
        assert!(matches!(err, ProbeError::Failed(ref m) if m.contains("503")));
    }

    #[tokio::test]
    async fn http_probe_to_closed_port_is_unreachable() {
        let err = HttpProbe::new("127.0.0.1:1", "/health").probe().await.unwrap_err();
        assert!(matches!(err, ProbeError::Unreachable(_)));
    }

    #[tokio::test]
    async fn tcp_probe_connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(TcpProbe::new(&addr).probe().await.is_ok());
        drop(listener);
    }

    #[tokio::test]
    async fn command_probe_uses_exit_status() {
        assert!(CommandProbe::new("exit 0").probe().await.is_ok());
        let err = CommandProbe::new("echo broken >&2; exit 3")
            .probe()
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProbeError::Failed("probe command exited with status 3: broken".to_string())
        );
    }
}
