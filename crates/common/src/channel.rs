//! Async channel bridge between Tokio runtime and USB worker thread
//!
//! Every command carries a oneshot sender for its single completion. The
//! worker drains the command queue one command at a time, which is what
//! serializes transfers on a session's output endpoint.

use async_channel::{Receiver, Sender, bounded};
use protocol::{PortalError, PortalInfo, SessionId};
use tokio::sync::oneshot;

/// Completion channel for a command
pub type Responder<T> = oneshot::Sender<Result<T, PortalError>>;

/// Commands from Tokio runtime to USB worker thread
#[derive(Debug)]
pub enum PortalCommand {
    /// List every attached portal
    ListPortals {
        /// Channel to send response back
        response: Responder<Vec<PortalInfo>>,
    },

    /// Find the `index`-th attached portal
    FindPortal {
        /// Zero-based position among matching portals
        index: usize,
        /// Channel to send response back (`None` = no portal found)
        response: Responder<Option<PortalInfo>>,
    },

    /// Open a session on a previously discovered portal
    OpenSession {
        /// Portal to open
        portal: PortalInfo,
        /// Channel to send response back
        response: Responder<SessionId>,
    },

    /// Send a command frame (the worker adds the command prefix)
    SendFrame {
        /// Session to send on
        session: SessionId,
        /// Command payload
        payload: Vec<u8>,
        /// Channel to send response back
        response: Responder<()>,
    },

    /// Read one report from the session's input endpoint
    ReadFrame {
        /// Session to read from
        session: SessionId,
        /// Channel to send response back
        response: Responder<Vec<u8>>,
    },

    /// Close a session and release the device
    CloseSession {
        /// Session to close
        session: SessionId,
        /// Channel to send response back
        response: Responder<()>,
    },

    /// Shutdown the USB worker thread gracefully
    Shutdown,
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct PortalBridge {
    cmd_tx: Sender<PortalCommand>,
}

impl PortalBridge {
    /// Send a command to the USB worker thread
    pub async fn send_command(&self, cmd: PortalCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Queue a command without waiting (for use in `Drop`)
    ///
    /// Fails when the queue is full or the worker is gone.
    pub fn try_send_command(&self, cmd: PortalCommand) -> crate::Result<()> {
        self.cmd_tx
            .try_send(cmd)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Check whether the worker side is gone
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}

/// Handle for USB worker thread (blocking)
pub struct PortalWorker {
    cmd_rx: Receiver<PortalCommand>,
}

impl PortalWorker {
    /// Receive a command from Tokio runtime (blocking)
    ///
    /// Fails once every [`PortalBridge`] has been dropped.
    pub fn recv_command(&self) -> crate::Result<PortalCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<PortalCommand> {
        self.cmd_rx.try_recv().ok()
    }
}

/// Create the channel bridge between Tokio and the USB worker thread
///
/// Returns (PortalBridge for Tokio, PortalWorker for the USB thread)
pub fn create_portal_bridge() -> (PortalBridge, PortalWorker) {
    let (cmd_tx, cmd_rx) = bounded(256);

    (PortalBridge { cmd_tx }, PortalWorker { cmd_rx })
}
