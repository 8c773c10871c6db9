//! Completion notification on the shared ack bus
//!
//! The ack bus is arbitrated outside this controller. After a transaction
//! completes the arbiter raises a request tagged with the controller's
//! fixed id and holds it, unchanged, until the external `owned` grant is
//! seen. The request drops on the cycle the grant is observed.

use crate::error::{Error, Result};
use crate::host::AccelId;

/// Registered ack bus outputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckOutputs {
    /// Request line
    pub request: bool,
    /// Requester id (0 while not requesting)
    pub id: u8,
}

/// Single-request ack bus client
#[derive(Debug)]
pub struct AckArbiter {
    id: AccelId,
    armed: bool,
    request: bool,
    granted: u32,
}

impl AckArbiter {
    /// Create an arbiter presenting `id` on the bus
    pub const fn new(id: AccelId) -> Self {
        Self {
            id,
            armed: false,
            request: false,
            granted: 0,
        }
    }

    /// Drop any pending or armed request
    pub fn reset(&mut self) {
        self.armed = false;
        self.request = false;
    }

    /// Signal a completed transaction
    ///
    /// Fails with [`Error::AckPending`] if the previous completion has not
    /// been granted yet.
    pub fn notify_complete(&mut self) -> Result<()> {
        if self.armed || self.request {
            return Err(Error::AckPending);
        }
        self.armed = true;
        Ok(())
    }

    /// Advance one cycle with the externally driven grant
    ///
    /// Returns true if the request line changed.
    pub fn clock(&mut self, owned: bool) -> bool {
        if self.request && owned {
            self.request = false;
            self.granted += 1;
            log::debug!("ack: granted to {:?}", self.id);
            return true;
        }
        if self.armed {
            self.armed = false;
            self.request = true;
            log::debug!("ack: request as {:?}", self.id);
            return true;
        }
        false
    }

    /// Nothing armed or requested
    pub fn is_idle(&self) -> bool {
        !self.armed && !self.request
    }

    /// Number of grants received
    pub fn granted(&self) -> u32 {
        self.granted
    }

    /// Registered outputs
    pub fn outputs(&self) -> AckOutputs {
        AckOutputs {
            request: self.request,
            id: if self.request { self.id.bits() } else { 0 },
        }
    }
}
