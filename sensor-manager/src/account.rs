//! Account (bridge) handler.
//!
//! Owns the account-level status. Sensors report authorization failures and
//! successful calls here, and follow the account's status through a watch
//! channel.

use crate::status::{StatusDetail, StatusReporter, ThingStatus, ACCOUNT_THING_ID};
use flumewater::{ApiError, Authenticator};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct AccountHandler {
    authenticator: Authenticator,
    reporter: Arc<dyn StatusReporter>,
    status: watch::Sender<ThingStatus>,
    init_task: Mutex<Option<JoinHandle<()>>>,
}

impl AccountHandler {
    pub fn new(authenticator: Authenticator, reporter: Arc<dyn StatusReporter>) -> Arc<Self> {
        let (status, _) = watch::channel(ThingStatus::Unknown);
        Arc::new(Self {
            authenticator,
            reporter,
            status,
            init_task: Mutex::new(None),
        })
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn status(&self) -> ThingStatus {
        self.status.borrow().clone()
    }

    /// Follows every status change of the account.
    pub fn subscribe(&self) -> watch::Receiver<ThingStatus> {
        self.status.subscribe()
    }

    /// Reports Unknown, then confirms the credentials in the background.
    pub fn initialize(self: &Arc<Self>) {
        info!("Initializing Flume account");
        self.update(ThingStatus::Unknown);

        let handler = Arc::clone(self);
        let task = tokio::spawn(async move {
            handler.check_authorization().await;
        });

        let mut slot = self.init_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Runs one authorization check and maps its outcome to a status.
    pub async fn check_authorization(&self) {
        match self.authenticator.authorize().await {
            Ok(()) => self.update(ThingStatus::Online),
            Err(ApiError::Cancelled) => warn!("Authorization attempt was cancelled unexpectedly"),
            Err(e) if e.is_authorization() => self.apply_authorization_error(e.message()),
            Err(e) => self.update(ThingStatus::offline(
                StatusDetail::CommunicationError,
                e.message(),
            )),
        }
    }

    /// Takes the account offline; every sensor follows as bridge-offline.
    pub fn apply_authorization_error(&self, reason: &str) {
        debug!(reason = %reason, "Account notified of authorization error, setting it offline");
        self.update(ThingStatus::offline(StatusDetail::ConfigurationError, reason));
    }

    /// A device-level call succeeded, so the account must be online.
    pub fn set_online(&self) {
        if !self.status.borrow().is_online() {
            debug!("Account notified of successful request, setting it online");
            self.update(ThingStatus::Online);
        }
    }

    /// Stops the background check and the shared HTTP client. Idempotent.
    pub fn dispose(&self) {
        debug!("Disposing Flume account handler");
        if let Some(task) = self
            .init_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.authenticator.transport().stop();
    }

    fn update(&self, status: ThingStatus) {
        self.reporter.report(ACCOUNT_THING_ID, status.clone());
        self.status.send_replace(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusBoard;
    use crate::test_support::{account_config, token_body, USER_ID};
    use flumewater::Transport;
    use std::time::Duration;

    fn handler(endpoint: &str, board: &StatusBoard) -> Arc<AccountHandler> {
        let account = account_config(endpoint);
        let transport = Arc::new(Transport::from_config(&account));
        AccountHandler::new(
            Authenticator::new(account, transport),
            Arc::new(board.clone()),
        )
    }

    async fn settled(handler: &AccountHandler) -> ThingStatus {
        let mut rx = handler.subscribe();
        let status = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| *s != ThingStatus::Unknown),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        status
    }

    #[tokio::test]
    async fn test_initialize_goes_online() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(token_body())
            .create_async()
            .await;

        let board = StatusBoard::new();
        let handler = handler(&server.url(), &board);
        handler.initialize();

        assert_eq!(settled(&handler).await, ThingStatus::Online);
        assert_eq!(board.status(ACCOUNT_THING_ID), Some(ThingStatus::Online));
        assert_eq!(handler.authenticator().user_id(), USER_ID);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_configuration_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(401)
            .with_body(r#"{"success":false,"code":401,"message":"Invalid credentials"}"#)
            .create_async()
            .await;

        let board = StatusBoard::new();
        let handler = handler(&server.url(), &board);
        handler.initialize();

        let status = settled(&handler).await;
        assert_eq!(
            status,
            ThingStatus::offline(StatusDetail::ConfigurationError, "Invalid credentials")
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_is_communication_error() {
        let board = StatusBoard::new();
        let handler = handler("http://127.0.0.1:9/", &board);
        handler.check_authorization().await;

        assert!(handler
            .status()
            .has_detail(StatusDetail::CommunicationError));
    }

    #[tokio::test]
    async fn test_set_online_and_broadcast() {
        let board = StatusBoard::new();
        let handler = handler("http://127.0.0.1:9/", &board);
        let mut rx = handler.subscribe();

        handler.apply_authorization_error("token revoked");
        assert!(rx.has_changed().unwrap());
        assert!(rx
            .borrow_and_update()
            .has_detail(StatusDetail::ConfigurationError));

        handler.set_online();
        assert_eq!(*rx.borrow_and_update(), ThingStatus::Online);

        // Already online: no further broadcast
        handler.set_online();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let board = StatusBoard::new();
        let handler = handler("http://127.0.0.1:9/", &board);
        handler.authenticator().transport().start().unwrap();

        handler.dispose();
        handler.dispose();
        assert!(!handler.authenticator().transport().is_running());
    }
}
