//! Fast and slow client pools sharing one client-auth TLS context

use clientauth_core::{ClientAuthConfig, ClientAuthError, PoolKind, PoolTimeouts, Result};
use clientauth_tls::{TlsContext, TlsContextBuilder};
use std::sync::Arc;
use tracing::{debug, info};

use crate::pool::ClientPool;

/// Lifecycle of a factory. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryState {
    /// Context built, pools not yet created
    Fresh,
    /// Both pools are open
    Ready,
    Closed,
}

/// Owns the TLS context and the fast/slow pools built from it.
///
/// The two pools exist together or not at all.
#[derive(Debug)]
pub struct ClientAuthClientFactory {
    context: Arc<TlsContext>,
    fast: Option<Arc<ClientPool>>,
    slow: Option<Arc<ClientPool>>,
    state: FactoryState,
}

impl ClientAuthClientFactory {
    /// Build the context from `config`, then both pools
    pub fn new(config: &ClientAuthConfig, timeouts: &PoolTimeouts) -> Result<Self> {
        let context = TlsContextBuilder::from_config(config).build()?;
        let mut factory = Self::with_context(context);
        factory.build_clients(timeouts)?;
        Ok(factory)
    }

    /// Wrap an already built context; pools are created by [`Self::build_clients`]
    pub fn with_context(context: TlsContext) -> Self {
        Self {
            context: Arc::new(context),
            fast: None,
            slow: None,
            state: FactoryState::Fresh,
        }
    }

    /// Create the fast and slow pools. Only valid on a fresh factory.
    pub fn build_clients(&mut self, timeouts: &PoolTimeouts) -> Result<()> {
        if self.state != FactoryState::Fresh {
            return Err(ClientAuthError::ClientConstruction(format!(
                "pools can only be built once, factory is {:?}",
                self.state
            )));
        }
        timeouts.validate()?;

        let fast = ClientPool::with_tls(
            PoolKind::Fast,
            &self.context,
            timeouts.fast_connect_timeout(),
            timeouts.fast_request_timeout(),
        )?;
        let slow = ClientPool::with_tls(
            PoolKind::Slow,
            &self.context,
            timeouts.slow_connect_timeout(),
            timeouts.slow_request_timeout(),
        )?;

        info!(
            "Client auth pools ready: fast (connect {} ms, request {} ms), \
             slow (connect {} ms, request {} ms)",
            timeouts.fast_connect_timeout_ms,
            timeouts.fast_request_timeout_ms,
            timeouts.slow_connect_timeout_ms,
            timeouts.slow_request_timeout_ms
        );

        self.fast = Some(Arc::new(fast));
        self.slow = Some(Arc::new(slow));
        self.state = FactoryState::Ready;
        Ok(())
    }

    pub fn fast_client(&self) -> Option<Arc<ClientPool>> {
        self.fast.clone()
    }

    pub fn slow_client(&self) -> Option<Arc<ClientPool>> {
        self.slow.clone()
    }

    pub fn context(&self) -> &Arc<TlsContext> {
        &self.context
    }

    pub fn state(&self) -> FactoryState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == FactoryState::Closed
    }

    /// Close whichever pools are still open and mark the factory closed.
    ///
    /// Repeated calls are no-ops. Handles already given out stay valid but
    /// reject new requests.
    pub fn close_clients(&mut self) {
        if self.state == FactoryState::Closed {
            debug!("Client auth factory already closed");
            return;
        }

        let mut closed = 0;
        for pool in [self.fast.take(), self.slow.take()].into_iter().flatten() {
            if pool.close() {
                closed += 1;
            }
        }
        self.state = FactoryState::Closed;
        info!("Client auth factory closed ({} pool(s) released)", closed);
    }
}

impl Drop for ClientAuthClientFactory {
    fn drop(&mut self) {
        self.close_clients();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::KeyMaterialFixture;

    #[test]
    fn test_new_builds_both_pools() {
        let fixture = KeyMaterialFixture::jks("changeit");
        let factory =
            ClientAuthClientFactory::new(&fixture.config(), &PoolTimeouts::default()).unwrap();

        assert_eq!(factory.state(), FactoryState::Ready);
        assert!(!factory.is_closed());

        let fast = factory.fast_client().unwrap();
        let slow = factory.slow_client().unwrap();
        assert_eq!(fast.kind(), PoolKind::Fast);
        assert_eq!(slow.kind(), PoolKind::Slow);
        assert!(fast.has_tls() && slow.has_tls());
        assert_eq!(fast.connect_timeout().as_millis(), 15_000);
        assert_eq!(fast.request_timeout().as_millis(), 15_000);
        assert_eq!(slow.connect_timeout().as_millis(), 60_000);
        assert_eq!(slow.request_timeout().as_millis(), 60_000);
        assert_eq!(factory.context().key_alias(), "client");
    }

    #[test]
    fn test_fast_request_timeout_is_independent() {
        let fixture = KeyMaterialFixture::jks("changeit");
        let timeouts = PoolTimeouts {
            fast_connect_timeout_ms: 1_000,
            fast_request_timeout_ms: 4_000,
            slow_connect_timeout_ms: 2_000,
            slow_request_timeout_ms: 90_000,
        };
        let factory = ClientAuthClientFactory::new(&fixture.config(), &timeouts).unwrap();

        let fast = factory.fast_client().unwrap();
        assert_eq!(fast.connect_timeout().as_millis(), 1_000);
        assert_eq!(fast.request_timeout().as_millis(), 4_000);
        assert_eq!(factory.slow_client().unwrap().request_timeout().as_millis(), 90_000);
    }

    #[test]
    fn test_missing_file_builds_nothing() {
        let fixture = KeyMaterialFixture::jks("changeit");
        std::fs::remove_file(&fixture.keystore).unwrap();

        let err = ClientAuthClientFactory::new(&fixture.config(), &PoolTimeouts::default())
            .unwrap_err();
        assert!(err.is_missing_file());
    }

    #[test]
    fn test_close_clients_is_idempotent() {
        let fixture = KeyMaterialFixture::jks("changeit");
        let mut factory =
            ClientAuthClientFactory::new(&fixture.config(), &PoolTimeouts::default()).unwrap();
        let fast = factory.fast_client().unwrap();
        let slow = factory.slow_client().unwrap();

        factory.close_clients();
        assert!(factory.is_closed());
        assert!(fast.is_closed() && slow.is_closed());
        assert!(factory.fast_client().is_none());
        assert!(factory.slow_client().is_none());

        factory.close_clients();
        assert_eq!(factory.state(), FactoryState::Closed);
        // each pool was closed by the first teardown only
        assert!(!fast.close());
        assert!(!slow.close());
    }

    #[test]
    fn test_two_phase_construction() {
        let fixture = KeyMaterialFixture::jks("changeit");
        let context = TlsContextBuilder::from_config(&fixture.config()).build().unwrap();
        let mut factory = ClientAuthClientFactory::with_context(context);
        assert_eq!(factory.state(), FactoryState::Fresh);
        assert!(factory.fast_client().is_none());

        factory.build_clients(&PoolTimeouts::default()).unwrap();
        assert_eq!(factory.state(), FactoryState::Ready);
        assert!(factory.build_clients(&PoolTimeouts::default()).is_err());

        factory.close_clients();
        assert!(factory.build_clients(&PoolTimeouts::default()).is_err());
    }

    #[test]
    fn test_fresh_factory_closes() {
        let fixture = KeyMaterialFixture::jks("changeit");
        let context = TlsContextBuilder::from_config(&fixture.config()).build().unwrap();
        let mut factory = ClientAuthClientFactory::with_context(context);

        factory.close_clients();
        assert!(factory.is_closed());
    }

    #[test]
    fn test_drop_closes_pools() {
        let fixture = KeyMaterialFixture::jks("changeit");
        let factory =
            ClientAuthClientFactory::new(&fixture.config(), &PoolTimeouts::default()).unwrap();
        let fast = factory.fast_client().unwrap();

        drop(factory);
        assert!(fast.is_closed());
    }
}
