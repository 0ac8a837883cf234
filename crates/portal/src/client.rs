//! Async portal client
//!
//! Front end of the portal bridge for code running on the Tokio runtime.
//! Every call is one command to the USB worker thread and completes once,
//! with the worker's result or [`PortalError::Timeout`].

use common::channel::Responder;
use common::{PortalBridge, PortalCommand};
use protocol::{PortalError, PortalInfo, SessionId};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Default time to wait for the worker to complete a command
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// A session opened through [`PortalClient::open`]
///
/// Only a successful open produces one, so frames can never be sent to a
/// portal whose handshake failed. Not `Clone`: [`PortalClient::close`]
/// consumes it. Dropping a handle without closing it queues a close on
/// the worker without waiting for the result.
pub struct SessionHandle {
    id: SessionId,
    portal: PortalInfo,
    /// Taken by [`PortalClient::close`]; still set means close on drop
    bridge: Option<PortalBridge>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("portal", &self.portal)
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The portal this session was opened on
    pub fn portal(&self) -> &PortalInfo {
        &self.portal
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        let Some(bridge) = self.bridge.take() else {
            return;
        };

        // Nobody waits for the result
        let (response, _) = oneshot::channel();
        match bridge.try_send_command(PortalCommand::CloseSession {
            session: self.id,
            response,
        }) {
            Ok(()) => debug!("Queued close for dropped session {:?}", self.id),
            // Worker already stopped and closed everything
            Err(_) if bridge.is_closed() => {}
            Err(e) => warn!("Could not close dropped session {:?}: {}", self.id, e),
        }
    }
}

/// Async handle to the USB worker thread
#[derive(Clone)]
pub struct PortalClient {
    bridge: PortalBridge,
    timeout: Duration,
}

impl PortalClient {
    /// Create a client; each call waits at most `timeout` for completion
    pub fn new(bridge: PortalBridge, timeout: Duration) -> Self {
        Self { bridge, timeout }
    }

    /// Same worker, different per-call timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            bridge: self.bridge.clone(),
            timeout,
        }
    }

    /// List every attached portal
    pub async fn list(&self) -> Result<Vec<PortalInfo>, PortalError> {
        self.request(|response| PortalCommand::ListPortals { response })
            .await
    }

    /// Find the `index`-th attached portal; `None` means no portal found
    pub async fn find(&self, index: usize) -> Result<Option<PortalInfo>, PortalError> {
        self.request(|response| PortalCommand::FindPortal { index, response })
            .await
    }

    /// Open a session and run the activation handshake
    pub async fn open(&self, portal: &PortalInfo) -> Result<SessionHandle, PortalError> {
        let id = self
            .request(|response| PortalCommand::OpenSession {
                portal: portal.clone(),
                response,
            })
            .await?;

        Ok(SessionHandle {
            id,
            portal: portal.clone(),
            bridge: Some(self.bridge.clone()),
        })
    }

    /// Send a command frame (the product's prefix is added by the session)
    pub async fn send(&self, session: &SessionHandle, payload: &[u8]) -> Result<(), PortalError> {
        self.request(|response| PortalCommand::SendFrame {
            session: session.id,
            payload: payload.to_vec(),
            response,
        })
        .await
    }

    /// Read one report from the portal
    pub async fn read(&self, session: &SessionHandle) -> Result<Vec<u8>, PortalError> {
        self.request(|response| PortalCommand::ReadFrame {
            session: session.id,
            response,
        })
        .await
    }

    /// Close a session and release the portal
    pub async fn close(&self, mut session: SessionHandle) -> Result<(), PortalError> {
        session.bridge = None;
        self.request(|response| PortalCommand::CloseSession {
            session: session.id,
            response,
        })
        .await
    }

    /// Ask the worker thread to close all sessions and exit
    pub async fn shutdown(&self) -> Result<(), PortalError> {
        self.bridge
            .send_command(PortalCommand::Shutdown)
            .await
            .map_err(PortalError::from)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Responder<T>) -> PortalCommand,
    ) -> Result<T, PortalError> {
        let (tx, rx) = oneshot::channel();
        self.bridge.send_command(build(tx)).await?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PortalError::Channel(
                "USB worker dropped the request".to_string(),
            )),
            Err(_) => {
                debug!("Portal command timed out after {:?}", self.timeout);
                Err(PortalError::Timeout(self.timeout))
            }
        }
    }
}
