//! tracing-subscriber setup for binaries.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins over `default_directives`.
pub fn init(default_directives: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Default directives: SQL statements show up at debug when `sql_echo` is set.
pub fn default_directives(crate_name: &str, sql_echo: bool) -> String {
    let level = if sql_echo { "debug" } else { "info" };
    format!("{crate_name}={level},rest_scaffold={level},tower_http=info")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_follow_sql_echo() {
        assert_eq!(
            default_directives("library_server", true),
            "library_server=debug,rest_scaffold=debug,tower_http=info"
        );
        init("rest_scaffold=info");
        init("rest_scaffold=info");
    }
}
