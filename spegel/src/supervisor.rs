use std::sync::Arc;

use log::{error, info, warn};
use oci_spec::image::{Arch, Os};
use spegel_key::{PeerEndpoint, Platform};
use spegel_mirror::{Config, ConfigBuilder, Engine};
use spegel_router::{Bootstrap, ContentRouter, InMemoryRouter, StaticBootstrap, Table};
use spegel_store::{DirStore, OciStore};
use spegel_tracker::Tracker;

use crate::args::Args;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store: {0}")]
    Store(#[from] spegel_store::Error),
}

/// Owns the routing substrate and hands a shared handle to both long-running collaborators
/// (tracker, mirror engine): the tracker holds a pointer to the substrate, the mirror engine
/// holds the same one, constructed exactly once here. Shutdown closes the substrate last, after
/// both collaborators have stopped touching it.
pub struct Supervisor {
    router: Arc<InMemoryRouter>,
    store: Arc<DirStore>,
    tracker: Tracker<DirStore, InMemoryRouter>,
    engine: Engine,
}

impl Supervisor {
    pub async fn build(args: &Args) -> Result<Self, Error> {
        let platform = Platform {
            os: Os::Linux,
            arch: Arch::Amd64,
        };
        let store = Arc::new(DirStore::open(args.store_root.clone(), platform).await?);

        let table = Table::new();
        let local_addr = args.effective_local_addr();
        let self_endpoint = PeerEndpoint::new(local_addr.ip(), local_addr.port());
        let router = Arc::new(InMemoryRouter::new(table, self_endpoint, spegel_key::KEY_TTL));

        let bootstrap = StaticBootstrap::new(args.peers.clone());
        let peers = bootstrap.peers().await;
        info!("bootstrapped with {} configured peer(s)", peers.len());
        router.mark_bootstrapped();

        let tracker = Tracker::new(store.clone(), router.clone(), args.filter.clone());

        let engine = Engine::new(
            router.clone() as Arc<dyn ContentRouter>,
            store.clone() as Arc<dyn OciStore>,
            build_mirror_config(args),
        );

        Ok(Supervisor {
            router,
            store,
            tracker,
            engine,
        })
    }

    /// Runs the tracker and the mirror engine until `shutdown` resolves, then closes the
    /// substrate. `shutdown` is expected to be wired to the process's cancellation signal
    /// (ctrl-c in `main`).
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()> + Send + 'static) {
        if let Err(e) = self.store.verify().await {
            warn!("store verify failed at startup, continuing anyway: {e}");
        }

        let (tx, rx) = tokio::sync::watch::channel(false);

        let tracker = self.tracker;
        let tracker_rx = rx.clone();
        let tracker_task = tokio::spawn(async move { tracker.run(tracker_rx).await });

        tokio::spawn(async move {
            shutdown.await;
            info!("shutdown requested, stopping tracker and mirror engine");
            let _ = tx.send(true);
        });

        let mut engine_rx = rx.clone();
        let engine_shutdown = async move {
            let _ = engine_rx.wait_for(|v| *v).await;
        };
        if let Err(e) = self.engine.serve(engine_shutdown).await {
            error!("mirror engine exited with error: {e}");
        }

        match tracker_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("tracker exited with error: {e}"),
            Err(e) => error!("tracker task panicked: {e}"),
        }

        if let Err(e) = self.router.close().await {
            error!("substrate close failed: {e}");
        }
    }
}

fn build_mirror_config(args: &Args) -> Config {
    ConfigBuilder::new()
        .registry_addr(args.registry_addr)
        .local_addr(args.effective_local_addr())
        .metrics_addr(args.metrics_addr)
        .mirror_resolve_retries(args.mirror_resolve_retries)
        .mirror_resolve_timeout(args.mirror_resolve_timeout())
        .resolve_latest_tag(args.resolve_latest_tag)
        .shutdown_grace(args.shutdown_grace())
        .build()
}
