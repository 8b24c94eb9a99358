use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub fn logs_are_json() -> bool {
    matches!(std::env::var("FEEDCAST_LOG_FORMAT").as_deref(), Ok("json"))
}

/// Install the global subscriber. `RUST_LOG` picks the filter (default
/// `info`), `FEEDCAST_LOG_FORMAT=json` switches to JSON lines on stderr.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let builder = tracing_subscriber::registry().with(filter);

    if logs_are_json() {
        let _ = builder.with(fmt_layer.json().flatten_event(true)).try_init();
    } else {
        let _ = builder.with(fmt_layer.compact()).try_init();
    }
}
