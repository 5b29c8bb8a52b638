#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("router: {0}")]
    Router(#[from] spegel_router::Error),
    #[error("store: {0}")]
    Store(#[from] spegel_store::Error),
    #[error("upstream request failed: {0}")]
    Proxy(#[from] reqwest::Error),
}
