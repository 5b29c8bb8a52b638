use once_cell::sync::Lazy;
use prometheus::{register_int_gauge, IntGauge};

/// Number of local references the most recent full scan advertised at least one key for.
pub static TRACKED_IMAGES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tracker_images",
        "Local references advertised by the most recent full scan"
    )
    .unwrap()
});

/// Total content keys (manifest tag + config + layer digests, summed across references)
/// advertised by the most recent full scan.
pub static TRACKED_KEYS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tracker_keys",
        "Content keys advertised by the most recent full scan"
    )
    .unwrap()
});
