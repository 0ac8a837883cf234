//! USB worker thread
//!
//! Dedicated thread that owns the transport and every live session.
//! Commands arrive from the Tokio runtime over the portal bridge and are
//! handled one at a time, so transfers on a session never overlap.

use crate::discovery;
use crate::session::{self, LiveSession, SessionSettings};
use crate::transport::{PortalDevice, Transport};
use common::{PortalCommand, PortalWorker};
use protocol::{CommandBuilder, DeviceRegistry, PortalError, PortalInfo, SessionId};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

type Handle<T> = <<T as Transport>::Device as PortalDevice>::Handle;

/// USB worker thread
///
/// Processes commands from the Tokio runtime until a Shutdown command
/// arrives or every bridge is dropped, then closes all sessions.
pub struct PortalWorkerThread<T: Transport> {
    transport: T,
    registry: DeviceRegistry,
    commands: Box<dyn CommandBuilder>,
    settings: SessionSettings,
    sessions: HashMap<SessionId, LiveSession<Handle<T>>>,
    next_session_id: u32,
    worker: PortalWorker,
}

impl<T: Transport> PortalWorkerThread<T> {
    /// Create a new worker over `transport`
    pub fn new(
        worker: PortalWorker,
        transport: T,
        registry: DeviceRegistry,
        commands: Box<dyn CommandBuilder>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            transport,
            registry,
            commands,
            settings,
            sessions: HashMap::new(),
            next_session_id: 1,
            worker,
        }
    }

    /// Run the worker event loop
    pub fn run(mut self) {
        info!("USB worker thread started");

        loop {
            match self.worker.recv_command() {
                Ok(PortalCommand::Shutdown) => {
                    info!("USB worker shutting down");
                    break;
                }
                Ok(cmd) => self.handle_command(cmd),
                Err(e) => {
                    debug!("Portal bridge closed: {}", e);
                    break;
                }
            }
        }

        self.close_all();
        info!("USB worker thread stopped");
    }

    /// Handle a command from the Tokio runtime
    fn handle_command(&mut self, cmd: PortalCommand) {
        // A panic drops the command's responder, which the caller sees as a channel error
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in USB command handler: {:?}", e);
        }
    }

    fn handle_command_inner(&mut self, cmd: PortalCommand) {
        match cmd {
            PortalCommand::ListPortals { response } => {
                let result = discovery::list(&self.transport, &self.registry)
                    .map(|portals| portals.iter().map(|p| p.info()).collect::<Vec<_>>());
                if let Ok(portals) = &result {
                    debug!("Listing {} portals", portals.len());
                }
                let _ = response.send(result);
            }

            PortalCommand::FindPortal { index, response } => {
                let result = discovery::find(&self.transport, &self.registry, index)
                    .map(|found| found.map(|p| p.info()));
                let _ = response.send(result);
            }

            PortalCommand::OpenSession { portal, response } => {
                // Caller gave up (timeout): nobody holds the id, so close it again
                if let Err(Ok(id)) = response.send(self.open_session(&portal)) {
                    warn!("Open of session {:?} was abandoned, closing it", id);
                    self.close_session(id);
                }
            }

            PortalCommand::SendFrame {
                session,
                payload,
                response,
            } => {
                let result = self
                    .session(session)
                    .and_then(|live| live.send(&payload));
                let _ = response.send(result);
            }

            PortalCommand::ReadFrame { session, response } => {
                let result = self.session(session).and_then(|live| live.read());
                let _ = response.send(result);
            }

            PortalCommand::CloseSession { session, response } => {
                let result = match self.sessions.remove(&session) {
                    Some(live) => {
                        info!("Closing session {:?}", session);
                        live.close()
                    }
                    None => Err(PortalError::UnknownSession(session)),
                };
                let _ = response.send(result);
            }

            PortalCommand::Shutdown => {
                // Already handled in main loop
                unreachable!()
            }
        }
    }

    fn open_session(&mut self, portal: &PortalInfo) -> Result<SessionId, PortalError> {
        let descriptor = discovery::locate(&self.transport, portal)?;
        let live = session::open(descriptor, self.commands.as_ref(), self.settings)?;

        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;
        self.sessions.insert(id, live);

        info!(
            "Opened session {:?} on portal {:04x}:{:04x}",
            id, portal.vendor_id, portal.product_id
        );
        Ok(id)
    }

    fn session(&self, id: SessionId) -> Result<&LiveSession<Handle<T>>, PortalError> {
        self.sessions
            .get(&id)
            .ok_or(PortalError::UnknownSession(id))
    }

    fn close_session(&mut self, id: SessionId) {
        if let Some(live) = self.sessions.remove(&id)
            && let Err(e) = live.close()
        {
            warn!("Failed to close session {:?}: {}", id, e);
        }
    }

    fn close_all(&mut self) {
        for (id, live) in self.sessions.drain() {
            if let Err(e) = live.close() {
                warn!("Failed to close session {:?}: {}", id, e);
            }
        }
    }
}

/// Spawn the USB worker thread
///
/// The transport is created on the worker thread by `make_transport`; if
/// that fails the thread exits with the error and the bridge closes.
pub fn spawn_portal_worker<T, F>(
    worker: PortalWorker,
    make_transport: F,
    registry: DeviceRegistry,
    commands: Box<dyn CommandBuilder>,
    settings: SessionSettings,
) -> std::io::Result<std::thread::JoinHandle<Result<(), rusb::Error>>>
where
    T: Transport + 'static,
    F: FnOnce() -> Result<T, rusb::Error> + Send + 'static,
{
    std::thread::Builder::new()
        .name("portal-worker".to_string())
        .spawn(move || {
            let transport = make_transport()?;
            PortalWorkerThread::new(worker, transport, registry, commands, settings).run();
            Ok(())
        })
}
