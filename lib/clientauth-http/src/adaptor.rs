//! Enable/shutdown switch for client authentication on a dispatcher

use clientauth_core::{ClientAuthConfig, ClientAuthError, PoolTimeouts, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::dispatcher::{RequestDispatcher, TransportKind};
use crate::factory::ClientAuthClientFactory;
use crate::pool::ClientPool;

/// Result of an enable call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    /// A new factory was built and its pools installed
    Enabled,
    /// A factory was already active; nothing changed
    AlreadyEnabled,
}

/// Result of a shutdown call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Closed,
    NotEnabled,
}

/// Holds at most one active [`ClientAuthClientFactory`].
///
/// The enable and shutdown transitions run under one mutex, so concurrent
/// callers never build two factories.
pub struct ClientAuthAdaptor {
    defaults: ClientAuthConfig,
    timeouts: PoolTimeouts,
    active: Mutex<Option<ClientAuthClientFactory>>,
}

impl ClientAuthAdaptor {
    /// Adaptor with the `userdata/` key material defaults and default timeouts
    pub fn new() -> Self {
        Self::with_defaults(ClientAuthConfig::default(), PoolTimeouts::default())
    }

    pub fn with_defaults(defaults: ClientAuthConfig, timeouts: PoolTimeouts) -> Self {
        Self {
            defaults,
            timeouts,
            active: Mutex::new(None),
        }
    }

    pub fn defaults(&self) -> &ClientAuthConfig {
        &self.defaults
    }

    pub fn timeouts(&self) -> &PoolTimeouts {
        &self.timeouts
    }

    pub fn enable(&self, dispatcher: &dyn RequestDispatcher) -> Result<EnableOutcome> {
        let config = self.defaults.clone();
        self.enable_with_config(dispatcher, &config)
    }

    pub fn enable_with_algorithm(
        &self,
        dispatcher: &dyn RequestDispatcher,
        algorithm: &str,
    ) -> Result<EnableOutcome> {
        let config = self.defaults.clone().with_algorithm(algorithm);
        self.enable_with_config(dispatcher, &config)
    }

    pub fn enable_with_paths(
        &self,
        dispatcher: &dyn RequestDispatcher,
        passphrase_path: impl Into<PathBuf>,
        keystore_path: impl Into<PathBuf>,
    ) -> Result<EnableOutcome> {
        let config = ClientAuthConfig {
            passphrase_path: passphrase_path.into(),
            keystore_path: keystore_path.into(),
            ..self.defaults.clone()
        };
        self.enable_with_config(dispatcher, &config)
    }

    pub fn enable_with_paths_and_algorithm(
        &self,
        dispatcher: &dyn RequestDispatcher,
        passphrase_path: impl Into<PathBuf>,
        keystore_path: impl Into<PathBuf>,
        algorithm: &str,
    ) -> Result<EnableOutcome> {
        let config = ClientAuthConfig {
            passphrase_path: passphrase_path.into(),
            keystore_path: keystore_path.into(),
            algorithm: algorithm.to_string(),
            ..self.defaults.clone()
        };
        self.enable_with_config(dispatcher, &config)
    }

    /// Build a factory from `config` and install its pools into the dispatcher.
    ///
    /// On failure the adaptor stays disabled and the call can be retried.
    pub fn enable_with_config(
        &self,
        dispatcher: &dyn RequestDispatcher,
        config: &ClientAuthConfig,
    ) -> Result<EnableOutcome> {
        let mut active = self.lock();
        if active.is_some() {
            debug!("Client auth already enabled, ignoring enable request");
            return Ok(EnableOutcome::AlreadyEnabled);
        }

        let factory = ClientAuthClientFactory::new(config, &self.timeouts)?;
        let (fast, slow) = match (factory.fast_client(), factory.slow_client()) {
            (Some(fast), Some(slow)) => (fast, slow),
            _ => {
                return Err(ClientAuthError::ClientConstruction(
                    "factory returned without pools".to_string(),
                ))
            }
        };

        dispatcher.set_custom_fast_client(fast);
        dispatcher.set_custom_slow_client(slow);
        dispatcher.set_active_transport_kind(TransportKind::CustomFast);
        *active = Some(factory);

        info!(
            "Client auth enabled with keystore {}",
            config.keystore_path.display()
        );
        Ok(EnableOutcome::Enabled)
    }

    /// Close the active factory's pools and discard it
    pub fn shutdown(&self) -> ShutdownOutcome {
        let mut active = self.lock();
        match active.take() {
            Some(mut factory) => {
                factory.close_clients();
                info!("Client auth shut down");
                ShutdownOutcome::Closed
            }
            None => {
                debug!("Client auth not enabled, nothing to shut down");
                ShutdownOutcome::NotEnabled
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().is_some()
    }

    pub fn fast_client(&self) -> Option<Arc<ClientPool>> {
        self.lock().as_ref().and_then(|f| f.fast_client())
    }

    pub fn slow_client(&self) -> Option<Arc<ClientPool>> {
        self.lock().as_ref().and_then(|f| f.slow_client())
    }

    // The guarded value is a plain Option, always consistent after a panic
    fn lock(&self) -> MutexGuard<'_, Option<ClientAuthClientFactory>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ClientAuthAdaptor {
    fn default() -> Self {
        Self::new()
    }
}
