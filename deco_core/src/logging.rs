//! Tracing setup for decoplan.
//!
//! Log lines go to stderr so a table or JSON document on stdout can be piped
//! untouched. The filter comes from `DECO_LOG`, then `RUST_LOG`, then the
//! level the caller asks for.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the filter directives
pub const LOG_ENV: &str = "DECO_LOG";

/// `debug` when the user asked for detail, otherwise warnings only
pub fn init_verbose(verbose: bool) {
    init_with_level(if verbose { "debug" } else { "warn" })
}

pub fn init_with_level(default_level: &str) {
    let directives = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok();

    let _ = tracing_subscriber::registry()
        .with(filter_from(directives, default_level))
        .with(
            fmt::layer()
                .compact()
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}

/// Filter from user directives, or `default_level` when they are absent or unparsable
fn filter_from(directives: Option<String>, default_level: &str) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(default_level))
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_directives_win() {
        let filter = filter_from(Some("deco_core=trace".into()), "warn");
        assert_eq!(filter.to_string(), "deco_core=trace");
    }

    #[test]
    fn test_missing_or_bad_directives_fall_back() {
        assert_eq!(filter_from(None, "warn").to_string(), "warn");
        assert_eq!(
            filter_from(Some("deco_core=loudly".into()), "info").to_string(),
            "info"
        );
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_test();
        init_with_level("warn");
        tracing::debug!("still running");
    }
}
