//! HTTP implementation of [`Transport`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, TransportError};
use crate::event::{wait_closed, Transport, TransportCloser, TransportEvent, TransportStream};
use crate::framing::{LineBuffer, DEFAULT_MAX_LINE_LEN};
use crate::policy::{FailureKind, ReconnectPolicy, ReconnectState};
use crate::request::{authorize, Credentials, HttpMethod, RequestSigner, SignableRequest, StreamRequest};

/// Streams newline-delimited bodies over HTTP with automatic reconnects.
///
/// Every [`Transport::open`] call spawns one worker task on the current tokio
/// runtime. The worker owns the connection, retries according to the
/// configured [`ReconnectPolicy`], and stops when the returned
/// [`TransportStream`] is closed or dropped.
#[derive(Clone)]
pub struct HttpTransport {
    policy: ReconnectPolicy,
    stall_timeout: Duration,
    connect_timeout: Duration,
    max_line_len: usize,
    signer: Option<Arc<dyn RequestSigner>>,
}

impl HttpTransport {
    /// Create a transport with the default policy and a 90 second stall window
    pub fn new() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            stall_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            max_line_len: DEFAULT_MAX_LINE_LEN,
            signer: None,
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Drop the connection once an unterminated line grows past this many bytes
    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    pub fn with_signer(mut self, signer: Option<Arc<dyn RequestSigner>>) -> Self {
        self.signer = signer;
        self
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn stall_timeout(&self) -> Duration {
        self.stall_timeout
    }

    fn build_client(&self, request: &StreamRequest) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().connect_timeout(self.connect_timeout);
        if !request.user_agent.is_empty() {
            builder = builder.user_agent(request.user_agent.clone());
        }
        if let Some(proxy) = &request.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| TransportError::InvalidRequest(format!("proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        builder
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("policy", &self.policy)
            .field("stall_timeout", &self.stall_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_line_len", &self.max_line_len)
            .field("signer", &self.signer.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: StreamRequest) -> Result<TransportStream> {
        let url = request.url()?;
        let endpoint = request.endpoint()?;

        if matches!(request.credentials, Some(Credentials::OAuth(_))) && self.signer.is_none() {
            return Err(TransportError::Signing(
                "OAuth credentials configured without a request signer".to_string(),
            ));
        }

        let client = self.build_client(&request)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (closer, close_rx) = TransportCloser::new();

        let worker = StreamWorker {
            client,
            request,
            url,
            endpoint,
            signer: self.signer.clone(),
            reconnect: ReconnectState::new(self.policy.clone()),
            stall_timeout: self.stall_timeout,
            max_line_len: self.max_line_len,
            events: events_tx,
            close_rx,
        };
        tokio::spawn(worker.run());

        Ok(TransportStream::new(events_rx, closer))
    }
}

/// How one connection attempt ended
enum Step {
    Closed,
    Failed(FailureKind),
}

struct StreamWorker {
    client: reqwest::Client,
    request: StreamRequest,
    url: Url,
    endpoint: Url,
    signer: Option<Arc<dyn RequestSigner>>,
    reconnect: ReconnectState,
    stall_timeout: Duration,
    max_line_len: usize,
    events: mpsc::UnboundedSender<TransportEvent>,
    close_rx: watch::Receiver<bool>,
}

impl StreamWorker {
    async fn run(mut self) {
        info!(method = %self.request.method, url = %self.endpoint, "Opening stream");

        loop {
            if *self.close_rx.borrow() {
                break;
            }

            let kind = match self.connect_once().await {
                Step::Closed => break,
                Step::Failed(kind) => kind,
            };

            let delay = match self.reconnect.next_delay(kind) {
                Ok(delay) => delay,
                Err(exhausted) => {
                    warn!(
                        retries = exhausted.retries,
                        timeout_ms = exhausted.timeout.as_millis() as u64,
                        "Reconnect budget exhausted"
                    );
                    self.emit(TransportEvent::MaxReconnects {
                        timeout: exhausted.timeout,
                        retries: exhausted.retries,
                    });
                    break;
                }
            };

            let retries = self.reconnect.attempts();
            debug!(?kind, retries, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
            if !self.emit(TransportEvent::Reconnect { timeout: delay, retries }) {
                break;
            }
            if !self.sleep(delay).await {
                break;
            }
        }

        debug!(url = %self.endpoint, "Stream worker stopped");
    }

    /// Send an event; `false` once the consumer is gone
    fn emit(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }

    async fn sleep(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = wait_closed(&mut self.close_rx) => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn build_request(&self) -> Result<reqwest::RequestBuilder> {
        let builder = match self.request.method {
            HttpMethod::Get => self.client.get(self.url.clone()),
            HttpMethod::Post => self
                .client
                .post(self.url.clone())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(self.request.form_body().unwrap_or_default()),
        };

        authorize(
            builder,
            SignableRequest {
                method: self.request.method,
                url: &self.endpoint,
                params: &self.request.params,
            },
            self.request.credentials.as_ref(),
            self.signer.as_deref(),
        )
    }

    async fn connect_once(&mut self) -> Step {
        let builder = match self.build_request() {
            Ok(builder) => builder,
            Err(e) => {
                warn!("Failed to build stream request: {}", e);
                self.emit(TransportEvent::Error(e.to_string()));
                return Step::Failed(FailureKind::Http);
            }
        };

        let result = tokio::select! {
            _ = wait_closed(&mut self.close_rx) => return Step::Closed,
            result = builder.send() => result,
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!("Stream connection failed: {}", e);
                self.emit(TransportEvent::Error(format!("Connection failed: {}", e)));
                return Step::Failed(FailureKind::Network);
            }
        };

        let status = response.status();
        match status.as_u16() {
            200 => {}
            401 => {
                warn!("Stream request unauthorized (HTTP 401)");
                self.emit(TransportEvent::Unauthorized);
                return Step::Failed(FailureKind::Http);
            }
            420 | 429 => {
                warn!(status = status.as_u16(), "Stream request rate limited");
                self.emit(TransportEvent::EnhanceYourCalm);
                return Step::Failed(FailureKind::RateLimited);
            }
            code => {
                let reason = status.canonical_reason().unwrap_or("Unknown");
                warn!(status = code, "Stream request rejected: {}", reason);
                self.emit(TransportEvent::Error(format!("HTTP {}: {}", code, reason)));
                return Step::Failed(FailureKind::Http);
            }
        }

        info!(url = %self.endpoint, "Stream connected");
        self.reconnect.reset();
        if !self.emit(TransportEvent::Connected) {
            return Step::Closed;
        }

        self.read_body(response).await
    }

    async fn read_body(&mut self, response: reqwest::Response) -> Step {
        let mut body = Box::pin(response.bytes_stream());
        let mut lines = LineBuffer::with_max_line_len(self.max_line_len);

        loop {
            let next = tokio::select! {
                _ = wait_closed(&mut self.close_rx) => return Step::Closed,
                next = tokio::time::timeout(self.stall_timeout, body.next()) => next,
            };

            match next {
                Err(_) => {
                    warn!(
                        stall_secs = self.stall_timeout.as_secs(),
                        "No data received within stall window"
                    );
                    if !self.emit(TransportEvent::NoDataReceived) {
                        return Step::Closed;
                    }
                }
                Ok(Some(Ok(chunk))) => {
                    for line in lines.push(&chunk) {
                        if !self.emit(TransportEvent::Line(line)) {
                            return Step::Closed;
                        }
                    }
                    if lines.is_overflowing() {
                        warn!(
                            pending = lines.pending_len(),
                            max = lines.max_line_len(),
                            "Unterminated line exceeds the length cap"
                        );
                        self.emit(TransportEvent::Error(format!(
                            "Line exceeds {} bytes without a newline",
                            lines.max_line_len()
                        )));
                        return Step::Failed(FailureKind::Network);
                    }
                }
                Ok(Some(Err(e))) => {
                    warn!("Stream read failed: {}", e);
                    self.emit(TransportEvent::Error(format!("Stream read failed: {}", e)));
                    return Step::Failed(FailureKind::Network);
                }
                Ok(None) => {
                    if let Some(tail) = lines.finish() {
                        self.emit(TransportEvent::Line(tail));
                    }
                    info!(url = %self.endpoint, "Stream closed by remote host");
                    self.emit(TransportEvent::Error(
                        "Stream closed by remote host".to_string(),
                    ));
                    return Step::Failed(FailureKind::Network);
                }
            }
        }
    }
}
