//! Site-stream control session.
//!
//! Created by a connection session when the server announces a control URI.
//! Every operation is one request; failures are returned and also reported
//! to the session's own error handler with a fixed message.

use std::fmt;
use std::sync::Arc;

use control_client::{ControlClient, ControlError, FriendsIds, SiteStreamInfo, UserIds};
use parking_lot::Mutex;
use stream_transport::Credentials;
use tracing::{debug, warn};

use crate::config::StreamConfig;

pub const INFO_FAILED: &str = "Failed to retrieve SiteStream info.";
pub const ADD_USER_FAILED: &str = "Failed to add user to SiteStream";
pub const REMOVE_USER_FAILED: &str = "Failed to remove user from SiteStream.";
pub const FRIENDS_IDS_FAILED: &str = "Failed to retrieve SiteStream user's friends.";

/// Receives control failure messages
pub type ControlErrorHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Management handle for one site stream. Clones share the error handler.
#[derive(Clone)]
pub struct ControlSession {
    client: ControlClient,
    on_error: Arc<Mutex<Option<ControlErrorHandler>>>,
}

impl ControlSession {
    /// Bind to `control_uri`, inheriting credentials, signer and user agent
    /// from `config`
    pub fn new(control_uri: impl Into<String>, config: &StreamConfig) -> Self {
        let client = ControlClient::new(control_uri)
            .with_base_url(config.site_stream_host.clone())
            .with_credentials(config.credentials.clone())
            .with_signer(config.signer.clone())
            .with_user_agent(&config.user_agent);

        Self {
            client,
            on_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace the inherited credentials
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.client = self.client.with_credentials(credentials);
        self
    }

    pub fn control_uri(&self) -> &str {
        self.client.control_uri()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.client.credentials()
    }

    /// Set the handler that receives failure messages
    pub fn on_error(&self, handler: impl Fn(&str) + Send + Sync + 'static) -> &Self {
        *self.on_error.lock() = Some(Arc::new(handler));
        self
    }

    pub(crate) fn set_error_handler(&self, handler: Option<ControlErrorHandler>) {
        *self.on_error.lock() = handler;
    }

    /// The current error handler, if any
    pub fn error_handler(&self) -> Option<ControlErrorHandler> {
        self.on_error.lock().clone()
    }

    pub async fn info(&self) -> Result<SiteStreamInfo, ControlError> {
        let result = self.client.info().await;
        self.report(result, INFO_FAILED)
    }

    pub async fn add_user(&self, ids: impl Into<UserIds>) -> Result<(), ControlError> {
        let ids = ids.into();
        debug!(users = %ids, "Adding users to site stream");
        let result = self.client.add_user(ids).await;
        self.report(result, ADD_USER_FAILED)
    }

    pub async fn remove_user(&self, ids: impl Into<UserIds>) -> Result<(), ControlError> {
        let ids = ids.into();
        debug!(users = %ids, "Removing users from site stream");
        let result = self.client.remove_user(ids).await;
        self.report(result, REMOVE_USER_FAILED)
    }

    pub async fn friends_ids(&self, id: impl Into<UserIds>) -> Result<FriendsIds, ControlError> {
        let result = self.client.friends_ids(id).await;
        self.report(result, FRIENDS_IDS_FAILED)
    }

    fn report<T>(&self, result: Result<T, ControlError>, message: &str) -> Result<T, ControlError> {
        if let Err(e) = &result {
            warn!(control_uri = %self.control_uri(), "{} ({})", message, e);
            // The lock is released before calling so the handler may replace itself
            let handler = self.error_handler();
            if let Some(handler) = handler {
                handler(message);
            }
        }
        result
    }
}

impl fmt::Debug for ControlSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlSession")
            .field("control_uri", &self.control_uri())
            .field("on_error", &self.on_error.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stream_transport::BasicCredentials;

    const CONTROL_URI: &str = "/1.1/site/c/1_1_54e345d655ee3e8df359ac033648530bfbe26c5g";

    fn config(server: &Server) -> StreamConfig {
        StreamConfig::default().with_site_stream_host(server.url())
    }

    fn collect_errors(session: &ControlSession) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_error(move |msg| sink.lock().push(msg.to_string()));
        seen
    }

    #[test]
    fn test_inherits_configured_credentials() {
        let config = StreamConfig::basic("bob", "secret");
        let session = ControlSession::new(CONTROL_URI, &config);
        assert_eq!(
            session.credentials(),
            Some(&Credentials::Basic(BasicCredentials::new("bob", "secret")))
        );

        let session = session.with_credentials(None);
        assert!(session.credentials().is_none());
    }

    #[tokio::test]
    async fn test_info_failure_reports_fixed_message() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", format!("{}/info.json", CONTROL_URI).as_str())
            .with_status(401)
            .with_body("secret server detail")
            .create_async()
            .await;

        let session = ControlSession::new(CONTROL_URI, &config(&server));
        let errors = collect_errors(&session);

        assert!(session.info().await.is_err());
        assert_eq!(*errors.lock(), vec![INFO_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn test_each_operation_has_its_message() {
        let mut server = Server::new_async().await;
        for path in ["add_user.json", "remove_user.json", "friends/ids.json"] {
            server
                .mock("POST", format!("{}/{}", CONTROL_URI, path).as_str())
                .with_status(500)
                .create_async()
                .await;
        }

        let session = ControlSession::new(CONTROL_URI, &config(&server));
        let errors = collect_errors(&session);

        assert!(session.add_user(12345u64).await.is_err());
        assert!(session.remove_user(vec![1u64, 2]).await.is_err());
        assert!(session.friends_ids(12345u64).await.is_err());

        assert_eq!(
            *errors.lock(),
            vec![
                ADD_USER_FAILED.to_string(),
                REMOVE_USER_FAILED.to_string(),
                FRIENDS_IDS_FAILED.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_success_does_not_report() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", format!("{}/add_user.json", CONTROL_URI).as_str())
            .with_status(200)
            .create_async()
            .await;

        let session = ControlSession::new(CONTROL_URI, &config(&server));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        session.on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        session.add_user("1234").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_reports() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let config = StreamConfig::default().with_site_stream_host(format!("http://{}", addr));
        let session = ControlSession::new(CONTROL_URI, &config);
        let errors = collect_errors(&session);

        let result = session.info().await;
        assert!(matches!(result, Err(ControlError::Network(_))));
        assert_eq!(*errors.lock(), vec![INFO_FAILED.to_string()]);
    }

    #[test]
    fn test_clones_share_error_handler() {
        let session = ControlSession::new(CONTROL_URI, &StreamConfig::default());
        let copy = session.clone();
        session.on_error(|_| {});
        assert!(copy.error_handler().is_some());
    }
}
