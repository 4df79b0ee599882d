//! End-to-end test support for the cart sync engine.
//!
//! Each test spawns the reference cart server on an ephemeral port and drives
//! one or more `CartEngine<HttpCartApi>` instances against it. Nothing external
//! is required.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cart-sync-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use cart_sync_client::{CartEngine, ClientConfig, HttpCartApi, MemorySnapshotStore};
use cart_sync_storefront::catalog::Catalog;
use cart_sync_storefront::config::StorefrontConfig;
use cart_sync_storefront::state::AppState;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// Debounce window used by test engines.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

/// A cart server running in the background for the duration of a test.
pub struct TestServer {
    pub base_url: Url,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server with the demo catalog and development login enabled.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");
        let base_url = Url::parse(&format!("http://{addr}")).expect("Invalid test URL");

        let config = StorefrontConfig::local(base_url.clone());
        let app = cart_sync_storefront::app(AppState::new(config, Catalog::demo()));
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { base_url, handle }
    }

    /// Client configuration pointing at this server.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.base_url.clone());
        config.debounce = TEST_DEBOUNCE;
        config
    }

    /// A new transport with its own cookie jar, i.e. a separate device.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    pub fn api(&self) -> HttpCartApi {
        HttpCartApi::new(&self.client_config()).expect("Failed to build HTTP client")
    }

    /// An engine over `api` persisting to `store`.
    #[must_use]
    pub fn engine(
        &self,
        api: &HttpCartApi,
        store: &Arc<MemorySnapshotStore>,
    ) -> CartEngine<HttpCartApi> {
        CartEngine::new(api.clone(), store.clone(), TEST_DEBOUNCE)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
