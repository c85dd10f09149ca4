//! Structured process log: the daemon's own operational diagnostics.
//!
//! This is distinct from the event journal -- it is where "kernel
//! module reload detected" or "netlink recv failed" go, via the ordinary
//! `log` facade and `env_logger`. It never touches the CSV journal.

use log::LevelFilter;
use std::sync::Once;

static INIT: Once = Once::new();

/// Install the process-wide diagnostic logger. Idempotent: only the first
/// call has any effect, matching `env_logger`'s own "install once" rule.
pub fn init(debug: bool) {
    INIT.call_once(|| {
        let default_filter = if debug { "debug" } else { "info" };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
            .init();
    });
    set_debug(debug);
}

/// Raise or lower the live logging threshold in response to the
/// `print_debug_log` configuration key, without restarting the daemon.
///
/// `env_logger` only takes a filter at construction time; `log::set_max_level`
/// is the usual escape hatch since every `log!` call site consults it before
/// formatting, independent of which backend was installed.
pub fn set_debug(debug: bool) {
    log::set_max_level(if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_debug_raises_and_lowers_max_level() {
        set_debug(true);
        assert_eq!(log::max_level(), LevelFilter::Debug);
        set_debug(false);
        assert_eq!(log::max_level(), LevelFilter::Info);
    }
}
