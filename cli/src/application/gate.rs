//! Per-server operation gate.
//!
//! `GatePermit` releases its hold when dropped, so an operation that fails
//! or panics halfway never leaves its server locked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::application::ports::OperationGate;
use crate::domain::{OrchestrationError, ServerId};

/// Proof that an operation holds a server. Dropping it releases the hold.
#[must_use = "the server is released as soon as the permit is dropped"]
pub struct GatePermit {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl GatePermit {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for GatePermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GatePermit")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Exclusive,
    Shared(usize),
}

/// In-process gate, keyed by server id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGate {
    holds: Arc<Mutex<HashMap<ServerId, Hold>>>,
}

impl InMemoryGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn release(holds: &Mutex<HashMap<ServerId, Hold>>, server: &ServerId) {
        let mut holds = holds.lock().unwrap_or_else(PoisonError::into_inner);
        match holds.get(server).copied() {
            Some(Hold::Shared(n)) if n > 1 => {
                holds.insert(server.clone(), Hold::Shared(n - 1));
            }
            _ => {
                holds.remove(server);
            }
        }
    }

    fn permit(&self, server: &ServerId) -> GatePermit {
        let holds = Arc::clone(&self.holds);
        let server = server.clone();
        GatePermit::new(move || Self::release(&holds, &server))
    }
}

impl OperationGate for InMemoryGate {
    fn try_exclusive(&self, server: &ServerId) -> Result<GatePermit, OrchestrationError> {
        {
            let mut holds = self.holds.lock().unwrap_or_else(PoisonError::into_inner);
            if holds.contains_key(server) {
                return Err(OrchestrationError::Busy(server.clone()));
            }
            holds.insert(server.clone(), Hold::Exclusive);
        }
        Ok(self.permit(server))
    }

    fn try_shared(&self, server: &ServerId) -> Result<GatePermit, OrchestrationError> {
        {
            let mut holds = self.holds.lock().unwrap_or_else(PoisonError::into_inner);
            let next = match holds.get(server) {
                Some(Hold::Exclusive) => return Err(OrchestrationError::Busy(server.clone())),
                Some(Hold::Shared(n)) => Hold::Shared(n + 1),
                None => Hold::Shared(1),
            };
            holds.insert(server.clone(), next);
        }
        Ok(self.permit(server))
    }
}
