//! Mutual-TLS HTTP client pools for a parallel request dispatcher
//!
//! This library provides:
//! - `ClientPool`: an HTTP client with its own connect and request timeouts
//! - `ClientAuthClientFactory`: the fast and slow pools sharing one TLS context
//! - `RequestDispatcher`: the seam that receives the pools, with an in-memory `TransportSlots`
//! - `ClientAuthAdaptor`: enable/shutdown of client authentication on a dispatcher

pub mod adaptor;
pub mod dispatcher;
pub mod factory;
pub mod pool;

#[cfg(test)]
pub(crate) mod testutil;

pub use adaptor::{ClientAuthAdaptor, EnableOutcome, ShutdownOutcome};
pub use dispatcher::{RequestDispatcher, TransportKind, TransportSlots};
pub use factory::{ClientAuthClientFactory, FactoryState};
pub use pool::{ClientPool, HttpMethod, PoolRequest, PoolResponse};
