//! HTTP seam. [`UreqTransport`] talks to the real API; tests supply their own
//! [`Transport`] implementations.

use std::io::ErrorKind;
use std::time::Duration;

use thiserror::Error;

/// Total item count header.
pub const TOTAL_HEADER: &str = "X-WP-Total";
/// Total page count header.
pub const TOTAL_PAGES_HEADER: &str = "X-WP-TotalPages";

/// A response of any status, with pagination metadata already extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub total: Option<u64>,
    pub total_pages: Option<u32>,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            total: None,
            total_pages: None,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            total: None,
            total_pages: None,
            body: String::new(),
        }
    }

    pub fn with_totals(mut self, total: u64, total_pages: u32) -> Self {
        self.total = Some(total);
        self.total_pages = Some(total_pages);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

/// Failures below the HTTP status level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("I/O error: {0}")]
    Io(String),
    /// Not worth retrying: malformed URL, unsupported scheme, ...
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Invalid(_))
    }
}

/// A blocking GET. Implementations must be shareable across fetch tasks.
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// ureq-backed transport; the timeout applies to each request.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("sitesync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        match self.agent.get(url).call() {
            Ok(response) => read_response(response),
            // ureq reports 4xx/5xx as errors; the fetcher wants them as data.
            Err(ureq::Error::Status(_, response)) => read_response(response),
            Err(ureq::Error::Transport(transport)) => Err(classify(transport)),
        }
    }
}

fn read_response(response: ureq::Response) -> Result<HttpResponse, TransportError> {
    let status = response.status();
    let total = response
        .header(TOTAL_HEADER)
        .and_then(|v| v.trim().parse().ok());
    let total_pages = response
        .header(TOTAL_PAGES_HEADER)
        .and_then(|v| v.trim().parse().ok());
    let body = response.into_string().map_err(|err| match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => TransportError::Timeout,
        _ => TransportError::Io(err.to_string()),
    })?;
    Ok(HttpResponse {
        status,
        total,
        total_pages,
        body,
    })
}

fn classify(transport: ureq::Transport) -> TransportError {
    let message = transport.to_string();
    match transport.kind() {
        ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed | ureq::ErrorKind::ProxyConnect => {
            TransportError::Connect(message)
        }
        ureq::ErrorKind::Io if message.contains("timed out") => TransportError::Timeout,
        ureq::ErrorKind::Io => TransportError::Io(message),
        ureq::ErrorKind::InvalidUrl
        | ureq::ErrorKind::UnknownScheme
        | ureq::ErrorKind::InsecureRequestHttpsOnly
        | ureq::ErrorKind::InvalidProxyUrl => TransportError::Invalid(message),
        _ => TransportError::Io(message),
    }
}
