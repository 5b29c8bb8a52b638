mod buffer_pool;
mod config;
mod error;
mod handler;
mod hosts_toml;
mod metrics;
mod proxy;
mod ratelimit;
mod request;

pub use buffer_pool::BufferPool;
pub use config::{Config, ConfigBuilder};
pub use error::Error;
pub use hosts_toml::{render as render_hosts_toml, MirrorEndpoint};
pub use proxy::ProxyClient;
pub use ratelimit::{format_byte_rate, parse_byte_rate, ByteRate, TokenBucketWriter};

use std::sync::Arc;

use axum::Router;
use log::info;

use handler::AppState;

/// Owns the mirror registry's HTTP surface: the `/v2/...` router plus a separate `/metrics`
/// listener, both sharing the routing substrate and OCI store handed to it by the supervisor.
pub struct Engine {
    state: Arc<AppState>,
}

impl Engine {
    pub fn new(
        router: Arc<dyn spegel_router::ContentRouter>,
        store: Arc<dyn spegel_store::OciStore>,
        config: Config,
    ) -> Self {
        Engine {
            state: Arc::new(AppState {
                router,
                store,
                proxy: ProxyClient::new(),
                buffer_pool: Arc::new(BufferPool::new()),
                config,
            }),
        }
    }

    pub fn registry_router(&self) -> Router {
        handler::build_router(self.state.clone())
    }

    pub fn metrics_router(&self) -> Router {
        Router::new().route("/metrics", axum::routing::get(metrics_handler))
    }

    /// Serves the registry router on `config.registry_addr` and the metrics router on
    /// `config.metrics_addr`. Once `shutdown` resolves, both listeners stop accepting and get
    /// `config.shutdown_grace` to drain in-flight requests before being force-cancelled.
    pub async fn serve(
        &self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let registry_listener =
            tokio::net::TcpListener::bind(self.state.config.registry_addr).await?;
        let metrics_listener = tokio::net::TcpListener::bind(self.state.config.metrics_addr).await?;
        info!(
            "mirror engine listening on {} (metrics on {})",
            self.state.config.registry_addr, self.state.config.metrics_addr
        );

        let registry_app = self.registry_router();
        let metrics_app = self.metrics_router();
        let grace = self.state.config.shutdown_grace;

        let (tx, _) = tokio::sync::watch::channel(false);
        let mut rx1 = tx.subscribe();
        let mut rx2 = tx.subscribe();

        let registry_task = tokio::spawn(async move {
            axum::serve(registry_listener, registry_app)
                .with_graceful_shutdown(async move {
                    let _ = rx1.wait_for(|v| *v).await;
                })
                .await
        });
        let metrics_task = tokio::spawn(async move {
            axum::serve(metrics_listener, metrics_app)
                .with_graceful_shutdown(async move {
                    let _ = rx2.wait_for(|v| *v).await;
                })
                .await
        });

        let registry_abort = registry_task.abort_handle();
        let metrics_abort = metrics_task.abort_handle();
        tokio::spawn(async move {
            shutdown.await;
            let _ = tx.send(true);
            tokio::time::sleep(grace).await;
            if !registry_abort.is_finished() {
                log::warn!("shutdown grace period ({grace:?}) elapsed, cancelling residual registry requests");
                registry_abort.abort();
            }
            if !metrics_abort.is_finished() {
                metrics_abort.abort();
            }
        });

        let _ = tokio::join!(registry_task, metrics_task);
        Ok(())
    }
}

async fn metrics_handler() -> impl axum::response::IntoResponse {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        log::error!("failed to encode metrics: {e}");
        return (http::StatusCode::INTERNAL_SERVER_ERROR, Vec::new());
    }
    (http::StatusCode::OK, buf)
}
