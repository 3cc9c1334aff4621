//! Kernel server REST client.

use std::time::Duration;

use log::debug;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION as WS_AUTHORIZATION, ORIGIN};

use super::error::{KernelError, KernelResult};
use super::socket::KernelSocket;

/// Timeout for the terminal resize mirror.
const RESIZE_TIMEOUT: Duration = Duration::from_secs(1);

/// Kernel server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelServerConfig {
    /// Base URL of the kernel server (e.g. "http://localhost:8888").
    pub url: String,
    /// API token, sent as `Authorization: Token <t>` and `?token=` on sockets.
    pub token: String,
    /// Kernel spec used when no workspace is requested.
    pub default_spec: String,
    /// Timeout for kernel/terminal creation and socket handshakes.
    pub create_timeout_secs: u64,
    /// Timeout for interrupt and delete calls.
    pub request_timeout_secs: u64,
}

impl Default for KernelServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8888".to_string(),
            token: String::new(),
            default_spec: "python3".to_string(),
            create_timeout_secs: 5,
            request_timeout_secs: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedKernel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedTerminal {
    name: String,
}

/// Client for the kernel server REST API and socket endpoints.
#[derive(Debug, Clone)]
pub struct KernelServerClient {
    /// HTTP client.
    client: Client,
    /// Base URL without trailing slash.
    base_url: String,
    token: String,
    default_spec: String,
    create_timeout: Duration,
    request_timeout: Duration,
}

impl KernelServerClient {
    /// Create a new kernel server client.
    pub fn new(config: &KernelServerConfig) -> KernelResult<Self> {
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            default_spec: config.default_spec.clone(),
            create_timeout: Duration::from_secs(config.create_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_spec(&self) -> &str {
        &self.default_spec
    }

    /// Browser link to the kernel server UI.
    pub fn session_link(&self) -> String {
        format!("{}/lab?token={}", self.base_url, self.token)
    }

    /// Message socket URL for a kernel.
    pub fn kernel_channels_url(&self, kernel_id: &str) -> String {
        format!(
            "{}/api/kernels/{}/channels?token={}",
            self.socket_base(),
            kernel_id,
            urlencoding::encode(&self.token)
        )
    }

    /// Socket URL for a terminal.
    pub fn terminal_socket_url(&self, name: &str) -> String {
        format!(
            "{}/terminals/websocket/{}?token={}",
            self.socket_base(),
            name,
            urlencoding::encode(&self.token)
        )
    }

    fn socket_base(&self) -> String {
        if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        }
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }

    fn map_send_error(&self, err: reqwest::Error) -> KernelError {
        if err.is_connect() || err.is_timeout() {
            KernelError::Unreachable {
                url: self.base_url.clone(),
                message: err.to_string(),
            }
        } else {
            KernelError::Request(err)
        }
    }

    /// Create a kernel from a kernel spec. Returns the kernel id.
    pub async fn create_kernel(&self, spec_name: &str) -> KernelResult<String> {
        let url = format!("{}/api/kernels", self.base_url);
        debug!("Creating kernel '{}' at {}", spec_name, url);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.auth_header())
            .json(&json!({ "name": spec_name }))
            .timeout(self.create_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(KernelError::Creation {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedKernel = response
            .json()
            .await
            .map_err(|e| KernelError::InvalidResponse(e.to_string()))?;
        Ok(created.id)
    }

    /// Delete a kernel.
    pub async fn delete_kernel(&self, kernel_id: &str) -> KernelResult<()> {
        let url = format!("{}/api/kernels/{}", self.base_url, kernel_id);
        let response = self
            .client
            .delete(&url)
            .header(AUTHORIZATION, self.auth_header())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        check_status("kernel deletion", response).await
    }

    /// Interrupt a running kernel.
    pub async fn interrupt_kernel(&self, kernel_id: &str) -> KernelResult<()> {
        let url = format!("{}/api/kernels/{}/interrupt", self.base_url, kernel_id);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.auth_header())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        check_status("kernel interrupt", response).await
    }

    /// Create a terminal. Returns the terminal name.
    pub async fn create_terminal(&self) -> KernelResult<String> {
        let url = format!("{}/api/terminals", self.base_url);
        debug!("Creating terminal at {}", url);
        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.auth_header())
            .timeout(self.create_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(KernelError::Creation {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedTerminal = response
            .json()
            .await
            .map_err(|e| KernelError::InvalidResponse(e.to_string()))?;
        Ok(created.name)
    }

    /// Delete a terminal.
    pub async fn delete_terminal(&self, name: &str) -> KernelResult<()> {
        let url = format!("{}/api/terminals/{}", self.base_url, name);
        let response = self
            .client
            .delete(&url)
            .header(AUTHORIZATION, self.auth_header())
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        check_status("terminal deletion", response).await
    }

    /// Tell the server about a terminal geometry change.
    pub async fn resize_terminal(&self, name: &str, cols: u16, rows: u16) -> KernelResult<()> {
        let url = format!("{}/api/terminals/{}/size", self.base_url, name);
        let response = self
            .client
            .patch(&url)
            .header(AUTHORIZATION, self.auth_header())
            .json(&json!({ "rows": rows, "cols": cols }))
            .timeout(RESIZE_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        check_status("terminal resize", response).await
    }

    /// Open a socket to the kernel server, bounded by the creation timeout.
    pub async fn connect(&self, url: &str) -> KernelResult<KernelSocket> {
        let mut request = url
            .into_client_request()
            .map_err(|e| KernelError::Socket(e.to_string()))?;
        let origin =
            HeaderValue::from_str(&self.base_url).map_err(|e| KernelError::Socket(e.to_string()))?;
        let auth = HeaderValue::from_str(&self.auth_header())
            .map_err(|e| KernelError::Socket(e.to_string()))?;
        request.headers_mut().insert(ORIGIN, origin);
        request.headers_mut().insert(WS_AUTHORIZATION, auth);

        let (socket, _response) = tokio::time::timeout(self.create_timeout, connect_async(request))
            .await
            .map_err(|_| {
                KernelError::Socket(format!("handshake timed out after {:?}", self.create_timeout))
            })?
            .map_err(|e| KernelError::Socket(e.to_string()))?;
        Ok(socket)
    }
}

async fn check_status(operation: &'static str, response: reqwest::Response) -> KernelResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(KernelError::Rejected {
        operation,
        status: status.as_u16(),
        body,
    })
}
