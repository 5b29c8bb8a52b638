mod error;
mod metrics;

pub use error::Error;

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use spegel_key::{re_advertise_interval, ContentKey, Reference};
use spegel_router::ContentRouter;
use spegel_store::{Event, EventKind, OciStore};

/// Keeps the routing substrate's view of this node's keys in sync with the local content store.
///
/// Construct with [`Tracker::new`], then drive it to completion with [`Tracker::run`] inside a
/// supervised task. `run` only returns on cancellation or a fatal event-stream error; advertise
/// failures during the periodic full rescan are logged and retried at the next tick, since the
/// rescan is idempotent.
pub struct Tracker<S, R> {
    store: Arc<S>,
    router: Arc<R>,
    filter: Option<String>,
}

impl<S, R> Tracker<S, R>
where
    S: OciStore + 'static,
    R: ContentRouter + 'static,
{
    pub fn new(store: Arc<S>, router: Arc<R>, filter: Option<String>) -> Self {
        Tracker {
            store,
            router,
            filter,
        }
    }

    /// Runs the tracker until `cancel` fires or the store's event stream ends for good.
    ///
    /// `cancel` is a `watch` receiver whose sender is dropped (or sent to) by the supervisor on
    /// shutdown, mirroring the single cancellable root context every long-running task in the
    /// system shares.
    pub async fn run(&self, mut cancel: tokio::sync::watch::Receiver<bool>) -> Result<(), Error> {
        let mut events = self.store.subscribe();
        self.full_scan().await;

        let mut ticker = tokio::time::interval(re_advertise_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // startup tick already covered by full_scan above

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    info!("tracker stopping on cancellation");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.full_scan().await;
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => self.handle_event(event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("tracker event stream lagged by {n}, relying on next full scan");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            return Err(Error::EventStreamClosed);
                        }
                    }
                }
            }
        }
    }

    async fn full_scan(&self) {
        let references = match self.store.list_references().await {
            Ok(r) => r,
            Err(e) => {
                warn!("tracker full scan: list_references failed: {e}");
                return;
            }
        };

        let mut image_count = 0u64;
        let mut key_count = 0u64;
        for reference in references {
            if let Some(filter) = &self.filter {
                if !reference.contains(filter.as_str()) {
                    continue;
                }
            }
            match self.enumerate_and_advertise(&reference).await {
                Ok(n) => {
                    image_count += 1;
                    key_count += n as u64;
                }
                Err(e) => warn!("tracker full scan: {reference}: {e}"),
            }
        }
        metrics::TRACKED_IMAGES.set(image_count as i64);
        metrics::TRACKED_KEYS.set(key_count as i64);
        debug!("tracker full scan complete: images={image_count} keys={key_count}");
    }

    async fn handle_event(&self, event: Event) {
        match event.kind {
            EventKind::Create => {
                if let Err(e) = self.enumerate_and_advertise(&event.reference).await {
                    warn!("tracker event update for {}: {e}", event.reference);
                }
            }
            EventKind::Delete => {
                debug!("tracker saw delete for {}, deferring to next full scan", event.reference);
            }
        }
    }

    async fn enumerate_and_advertise(&self, reference: &str) -> Result<usize, Error> {
        let parsed = Reference::parse(reference)?;
        let keys: Vec<ContentKey> = self.store.enumerate(&parsed).await?;
        self.router.advertise(&keys).await?;
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spegel_key::Platform;
    use spegel_router::{InMemoryRouter, Table};
    use spegel_store::DirStore;
    use tempfile::tempdir;

    fn platform() -> Platform {
        Platform {
            os: oci_spec::image::Os::Linux,
            arch: oci_spec::image::Arch::Amd64,
        }
    }

    #[tokio::test]
    async fn full_scan_advertises_every_local_reference() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DirStore::open(dir.path(), platform()).await.unwrap());
        store
            .put_image(
                "docker.io/library/alpine:3.20",
                "sha256:cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc",
                "application/vnd.oci.image.manifest.v1+json",
                b"not a real manifest but unused by this test",
            )
            .await
            .unwrap();

        let table = Table::new();
        let router = Arc::new(InMemoryRouter::new(
            table,
            "127.0.0.1:9".parse().unwrap(),
            Duration::from_secs(600),
        ));

        let tracker = Tracker::new(store, router.clone(), None);
        tracker.full_scan().await;

        let mut stream = router.resolve(
            &ContentKey::digest(
                "sha256:cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc"
                    .to_string(),
            ),
            true,
            Duration::from_millis(200),
        );
        use futures::StreamExt;
        assert!(stream.next().await.is_some());
    }

    #[tokio::test]
    async fn create_event_triggers_immediate_advertise() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DirStore::open(dir.path(), platform()).await.unwrap());
        let table = Table::new();
        let router = Arc::new(InMemoryRouter::new(
            table,
            "127.0.0.1:9".parse().unwrap(),
            Duration::from_secs(600),
        ));
        let tracker = Tracker::new(store.clone(), router.clone(), None);

        store
            .put_image(
                "docker.io/library/busybox:1.36",
                "sha256:eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
                "application/vnd.oci.image.manifest.v1+json",
                b"unused",
            )
            .await
            .unwrap();

        tracker
            .handle_event(Event {
                kind: EventKind::Create,
                reference: "docker.io/library/busybox:1.36".to_string(),
            })
            .await;

        use futures::StreamExt;
        let mut stream = router.resolve(
            &ContentKey::tag_for(&Reference::parse("docker.io/library/busybox:1.36").unwrap())
                .unwrap(),
            true,
            Duration::from_millis(200),
        );
        assert!(stream.next().await.is_some());
    }
}
