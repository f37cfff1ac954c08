//! Tracing setup. All diagnostics go to stderr so stdout stays free for
//! the batch report.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVES: &str = "audioforge=info";

/// Install the global subscriber. Later calls are no-ops, so library users
/// and tests may call this freely.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    if json_requested() {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Machine-readable output is opted into with `RUST_LOG_FORMAT=json`.
fn json_requested() -> bool {
    std::env::var("RUST_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init();
        init();
    }

    #[test]
    fn default_directives_scope_to_this_crate() {
        let filter = EnvFilter::new(DEFAULT_DIRECTIVES);
        assert!(format!("{filter:?}").contains("audioforge"));
    }
}
