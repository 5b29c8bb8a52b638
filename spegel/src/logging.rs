/// Initializes the `env_logger` backend for the `log` facade used throughout every crate in
/// the workspace. Respects `RUST_LOG`; defaults to `info` when unset so a plain `spegel`
/// invocation isn't silent.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
