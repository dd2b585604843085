use tracing_subscriber::EnvFilter;

use crate::env::get_env_bool;

/// Initializes tracing output. Level defaults to info unless RUST_LOG says
/// otherwise; LOG_JSON switches to JSON lines for log shippers.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if get_env_bool("LOG_JSON").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    };
}
