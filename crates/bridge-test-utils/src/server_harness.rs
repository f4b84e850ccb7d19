//! Test server harness for E2E testing
//!
//! Provides `TestBridgeServer` for spawning real bridge service instances in tests.

use bridge_service::config::Config;
use bridge_service::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the bridge service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> anyhow::Result<()> {
///     let idp = MockIdp::start(TestKeypair::new(1, "key-1")).await;
///     let server = TestBridgeServer::spawn(&idp.uri(), &[]).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestBridgeServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestBridgeServer {
    /// Spawn a server trusting `auth_server`, with extra environment
    /// variables layered over the defaults.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Use a short outbound timeout so unreachable IdPs fail fast
    /// - Record metrics into a private, non-global recorder
    pub async fn spawn(auth_server: &str, vars: &[(&str, &str)]) -> Result<Self, anyhow::Error> {
        let mut env = HashMap::from([
            ("AUTH_SERVER".to_string(), auth_server.to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("HTTP_TIMEOUT_MS".to_string(), "2000".to_string()),
        ]);
        for (key, value) in vars {
            env.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&env)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(
            AppState::from_config(config)
                .map_err(|e| anyhow::anyhow!("Failed to build app state: {}", e))?,
        );

        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared application state, for inspecting the verifier or draining flag.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }
}

impl Drop for TestBridgeServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
