//! Dispatcher interface receiving client-auth pools, plus an in-memory implementation

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::pool::ClientPool;

/// Transport slots a dispatcher can route requests through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Fast,
    Slow,
    CustomFast,
    CustomSlow,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Fast => f.write_str("fast"),
            TransportKind::Slow => f.write_str("slow"),
            TransportKind::CustomFast => f.write_str("custom-fast"),
            TransportKind::CustomSlow => f.write_str("custom-slow"),
        }
    }
}

/// Receives the client-auth pools when client authentication is enabled
pub trait RequestDispatcher: Send + Sync {
    fn set_custom_fast_client(&self, pool: Arc<ClientPool>);

    fn set_custom_slow_client(&self, pool: Arc<ClientPool>);

    fn set_active_transport_kind(&self, kind: TransportKind);
}

/// In-memory transport table keyed by [`TransportKind`]
pub struct TransportSlots {
    slots: RwLock<HashMap<TransportKind, Arc<ClientPool>>>,
    active: RwLock<TransportKind>,
}

impl TransportSlots {
    /// Empty table with `Fast` active
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            active: RwLock::new(TransportKind::Fast),
        }
    }

    /// Install a pool into any slot
    pub fn set_client(&self, kind: TransportKind, pool: Arc<ClientPool>) {
        if let Ok(mut slots) = self.slots.write() {
            slots.insert(kind, pool);
            debug!("Installed pool into {} transport slot", kind);
        }
    }

    pub fn client(&self, kind: TransportKind) -> Option<Arc<ClientPool>> {
        self.slots
            .read()
            .ok()
            .and_then(|slots| slots.get(&kind).cloned())
    }

    pub fn active_kind(&self) -> TransportKind {
        self.active
            .read()
            .map(|kind| *kind)
            .unwrap_or(TransportKind::Fast)
    }

    /// Pool in the active slot, if one is installed
    pub fn active_client(&self) -> Option<Arc<ClientPool>> {
        self.client(self.active_kind())
    }
}

impl Default for TransportSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestDispatcher for TransportSlots {
    fn set_custom_fast_client(&self, pool: Arc<ClientPool>) {
        self.set_client(TransportKind::CustomFast, pool);
    }

    fn set_custom_slow_client(&self, pool: Arc<ClientPool>) {
        self.set_client(TransportKind::CustomSlow, pool);
    }

    fn set_active_transport_kind(&self, kind: TransportKind) {
        if let Ok(mut active) = self.active.write() {
            *active = kind;
            debug!("Active transport set to {}", kind);
        }
    }
}
