//! Portal command builder
//!
//! The session layer treats command payloads as opaque bytes. The
//! [`CommandBuilder`] trait is the seam it uses for the two frames it sends
//! on its own during the handshake; [`PortalCommands`] is the default
//! implementation and also provides the extra commands the CLI uses.

/// Source of the bootstrap frames sent while a session is opened
pub trait CommandBuilder: Send {
    /// Payload of the reset frame (sent first after the interface is claimed)
    fn reset(&self) -> Vec<u8>;

    /// Payload of the activate frame (its completion completes the open)
    fn activate(&self) -> Vec<u8>;
}

/// Default portal command set
#[derive(Debug, Clone, Copy, Default)]
pub struct PortalCommands;

impl PortalCommands {
    /// Turn the portal off (`A 00`)
    pub fn deactivate(&self) -> Vec<u8> {
        vec![b'A', 0x00]
    }

    /// Set the portal light colour (`C r g b`)
    pub fn color(&self, red: u8, green: u8, blue: u8) -> Vec<u8> {
        vec![b'C', red, green, blue]
    }

    /// Request a status report (`S`)
    pub fn status(&self) -> Vec<u8> {
        vec![b'S']
    }

    /// Query one block of the figure in `slot` (`Q 1x bb`)
    pub fn query(&self, slot: u8, block: u8) -> Vec<u8> {
        vec![b'Q', 0x10 | (slot & 0x0f), block]
    }
}

impl CommandBuilder for PortalCommands {
    fn reset(&self) -> Vec<u8> {
        vec![b'R']
    }

    fn activate(&self) -> Vec<u8> {
        vec![b'A', 0x01]
    }
}
