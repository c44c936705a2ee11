//! Docker Engine REST client.
//!
//! One HTTP/1.1 connection per request, driven by `hyper`'s low-level
//! client. The transport is picked from the venue's auth URL: a
//! `unix://` socket, or TCP wrapped in TLS when TLS material is supplied.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode, header};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::{TcpStream, UnixStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::engine::{Engine, EngineFuture, LogStream};
use crate::error::{EngineError, EngineResult};
use crate::logs::LogDecoder;
use crate::model::*;

const API_VERSION: &str = "v1.41";
const DEFAULT_PORT: u16 = 2375;
const DEFAULT_TLS_PORT: u16 = 2376;
const LOG_CHANNEL_CAPACITY: usize = 256;

/// Where an engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Parse `unix:///path`, `tcp://host[:port]` or `http(s)://host[:port]`.
    pub fn parse(url: &str, tls: bool) -> EngineResult<Self> {
        let invalid = || EngineError::InvalidEndpoint(url.to_string());

        if let Some(path) = url.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid());
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }

        let rest = ["tcp://", "http://", "https://"]
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
            .ok_or_else(invalid)?;
        let authority = rest.split('/').next().unwrap_or_default();
        if authority.is_empty() {
            return Err(invalid());
        }

        let default_port = if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, default_port),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Endpoint::Tcp {
            host: host.to_string(),
            port,
        })
    }

    fn host_header(&self) -> String {
        match self {
            Endpoint::Unix(_) => "localhost".to_string(),
            Endpoint::Tcp { host, port } => format!("{host}:{port}"),
        }
    }
}

/// Engine handle for one Docker daemon.
pub struct DockerEngine {
    endpoint: Endpoint,
    tls: Option<TlsConnector>,
}

impl DockerEngine {
    pub fn new(endpoint: Endpoint, tls: Option<Arc<rustls::ClientConfig>>) -> Self {
        Self {
            endpoint,
            tls: tls.map(TlsConnector::from),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send one request and return the raw response.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> EngineResult<Response<Incoming>> {
        let uri = format!("/{API_VERSION}{path}");
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(header::HOST, self.endpoint.host_header())
            .header(header::USER_AGENT, "vnfm-engine/0.1");
        if body.is_some() {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| EngineError::Transport(format!("building {method} {uri}: {e}")))?;

        debug!(%method, %uri, "engine request");

        match &self.endpoint {
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path).await.map_err(|e| {
                    EngineError::Transport(format!("connecting to {}: {e}", path.display()))
                })?;
                exchange(TokioIo::new(stream), req).await
            }
            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(|e| EngineError::Transport(format!("connecting to {host}:{port}: {e}")))?;
                match &self.tls {
                    Some(connector) => {
                        let server_name = ServerName::try_from(host.clone()).map_err(|e| {
                            EngineError::Tls(format!("invalid tls server name '{host}': {e}"))
                        })?;
                        let stream = connector
                            .connect(server_name, stream)
                            .await
                            .map_err(|e| EngineError::Tls(format!("handshake with {host}: {e}")))?;
                        exchange(TokioIo::new(stream), req).await
                    }
                    None => exchange(TokioIo::new(stream), req).await,
                }
            }
        }
    }

    /// Send a request and collect a successful body.
    async fn call(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> EngineResult<Bytes> {
        let resp = self.send(method, path, body).await?;
        read_body(resp, path).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> EngineResult<T> {
        let body = self.call(Method::GET, path, None).await?;
        decode(&body, path)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
    ) -> EngineResult<T> {
        let body = self.call(Method::POST, path, Some(encode(payload)?)).await?;
        decode(&body, path)
    }

    async fn post<B: Serialize>(&self, path: &str, payload: Option<&B>) -> EngineResult<()> {
        let body = payload.map(encode).transpose()?;
        self.call(Method::POST, path, body).await?;
        Ok(())
    }
}

impl Engine for DockerEngine {
    fn list_networks(&self) -> EngineFuture<'_, Vec<Network>> {
        Box::pin(async move { self.get_json("/networks").await })
    }

    fn inspect_network<'a>(&'a self, id: &'a str) -> EngineFuture<'a, Network> {
        Box::pin(async move { self.get_json(&format!("/networks/{id}")).await })
    }

    fn connect_network<'a>(
        &'a self,
        network_id: &'a str,
        container_id: &'a str,
        endpoint: &'a EndpointSettings,
    ) -> EngineFuture<'a, ()> {
        Box::pin(async move {
            let req = ConnectRequest {
                container: container_id.to_string(),
                endpoint_config: endpoint.clone(),
            };
            self.post(&format!("/networks/{network_id}/connect"), Some(&req))
                .await
        })
    }

    fn list_images(&self) -> EngineFuture<'_, Vec<ImageSummary>> {
        Box::pin(async move { self.get_json("/images/json").await })
    }

    fn create_container<'a>(
        &'a self,
        name: &'a str,
        config: &'a ContainerConfig,
    ) -> EngineFuture<'a, Created> {
        Box::pin(async move {
            let path = format!("/containers/create?name={}", encode_query(name));
            self.post_json(&path, config).await
        })
    }

    fn start_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ()> {
        Box::pin(async move {
            self.post::<()>(&format!("/containers/{id}/start"), None)
                .await
        })
    }

    fn stop_container<'a>(&'a self, id: &'a str, grace: Duration) -> EngineFuture<'a, ()> {
        Box::pin(async move {
            let path = format!("/containers/{id}/stop?t={}", grace.as_secs());
            self.post::<()>(&path, None).await
        })
    }

    fn remove_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ()> {
        Box::pin(async move {
            self.call(Method::DELETE, &format!("/containers/{id}?force=true"), None)
                .await?;
            Ok(())
        })
    }

    fn inspect_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ContainerDetails> {
        Box::pin(async move { self.get_json(&format!("/containers/{id}/json")).await })
    }

    fn container_logs<'a>(&'a self, id: &'a str) -> EngineFuture<'a, LogStream> {
        Box::pin(async move {
            let path = format!("/containers/{id}/logs?stdout=true&stderr=true&timestamps=true");
            let resp = self.send(Method::GET, &path, None).await?;
            if !resp.status().is_success() {
                read_body(resp, &path).await?;
                return Err(EngineError::Transport(format!("{path}: no log stream")));
            }
            Ok(pump_logs(id.to_string(), resp.into_body()))
        })
    }

    fn create_service<'a>(&'a self, spec: &'a ServiceSpec) -> EngineFuture<'a, String> {
        Box::pin(async move {
            let created: Created = self.post_json("/services/create", spec).await?;
            Ok(created.id)
        })
    }

    fn inspect_service<'a>(&'a self, id: &'a str) -> EngineFuture<'a, Service> {
        Box::pin(async move { self.get_json(&format!("/services/{id}")).await })
    }

    fn update_service<'a>(
        &'a self,
        id: &'a str,
        version: u64,
        spec: &'a ServiceSpec,
    ) -> EngineFuture<'a, ()> {
        Box::pin(async move {
            let path = format!("/services/{id}/update?version={version}");
            self.post(&path, Some(spec)).await
        })
    }

    fn remove_service<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ()> {
        Box::pin(async move {
            self.call(Method::DELETE, &format!("/services/{id}"), None)
                .await?;
            Ok(())
        })
    }
}

/// Handshake on `io`, drive the connection in the background and send `req`.
async fn exchange<I>(io: I, req: Request<Full<Bytes>>) -> EngineResult<Response<Incoming>>
where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| EngineError::Transport(format!("handshake failed: {e}")))?;

    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "engine connection closed with error");
        }
    });

    sender
        .send_request(req)
        .await
        .map_err(|e| EngineError::Transport(format!("request failed: {e}")))
}

/// Collect a response body, mapping non-2xx statuses to engine errors.
async fn read_body(resp: Response<Incoming>, path: &str) -> EngineResult<Bytes> {
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| EngineError::Transport(format!("{path}: reading body: {e}")))?
        .to_bytes();

    // 304: container already started / stopped.
    if status.is_success() || status == StatusCode::NOT_MODIFIED {
        return Ok(body);
    }
    Err(api_error(status, &body, path))
}

fn api_error(status: StatusCode, body: &[u8], path: &str) -> EngineError {
    let message = serde_json::from_slice::<ApiMessage>(body)
        .ok()
        .map(|m| m.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    if status == StatusCode::NOT_FOUND {
        return EngineError::NotFound(format!("{path}: {message}"));
    }
    if message.contains("out of sequence") {
        return EngineError::VersionConflict(format!("{path}: {message}"));
    }
    EngineError::Api {
        status: status.as_u16(),
        message,
    }
}

fn encode<B: Serialize>(payload: &B) -> EngineResult<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| EngineError::Decode(format!("encoding request: {e}")))
}

fn decode<T: DeserializeOwned>(body: &[u8], path: &str) -> EngineResult<T> {
    serde_json::from_slice(body).map_err(|e| EngineError::Decode(format!("{path}: {e}")))
}

/// Percent-encode a query value.
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Decode a log body into lines on a detached task.
fn pump_logs(container_id: String, mut body: Incoming) -> LogStream {
    let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut decoder = LogDecoder::new();
        while let Some(frame) = body.frame().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(%container_id, error = %e, "log stream ended with error");
                    return;
                }
            };
            let Ok(data) = frame.into_data() else {
                continue;
            };
            for line in decoder.push(&data) {
                if tx.send(line).await.is_err() {
                    return;
                }
            }
        }
        if let Some(rest) = decoder.finish() {
            let _ = tx.send(rest).await;
        }
    });
    rx
}
