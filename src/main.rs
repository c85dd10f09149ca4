//! Entry point: parse the minimal CLI surface, initialise process logging,
//! and hand off to the lifecycle module's main loop.
//!
//! Argument handling proper is an external collaborator's concern (the
//! service unit that invokes this binary decides paths and flags); what's
//! here is just enough `clap` surface to override the two externally
//! visible paths for testing and to turn on debug logging before the
//! config cache has had a chance to.

use clap::Parser;
use deepin_anything_logger::lifecycle::{self, DEFAULT_CONTROL_DIR, DEFAULT_LOG_PATH};
use deepin_anything_logger::process_log;
use log::error;
use std::process::ExitCode;

/// Privileged filesystem-activity logger daemon for the deepin-anything
/// kernel module.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Kernel module control directory.
    #[arg(long, default_value_t = DEFAULT_CONTROL_DIR.to_string())]
    control_dir: String,

    /// Event journal path.
    #[arg(long, default_value_t = DEFAULT_LOG_PATH.to_string())]
    log_path: String,

    /// Log at debug verbosity before the config cache overrides it.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    process_log::init(args.debug);

    match lifecycle::run(&args.control_dir, &args.log_path) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            error!("fatal startup error: {err}");
            ExitCode::from(2)
        }
    }
}
