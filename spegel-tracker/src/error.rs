#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store: {0}")]
    Store(#[from] spegel_store::Error),
    #[error("router: {0}")]
    Router(#[from] spegel_router::Error),
    #[error("reference: {0}")]
    Reference(#[from] spegel_key::Error),
    #[error("event stream closed")]
    EventStreamClosed,
}
