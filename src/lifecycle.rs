//! Process lifecycle glue: startup ordering, signal handling, kernel
//! module presence/reload watching, and config-driven reconfiguration.
//!
//! Everything here is orchestration; the actual work lives in the
//! components it wires together ([`crate::control`], [`crate::listener`],
//! [`crate::worker`], [`crate::sink`], [`crate::config`], [`crate::mount`]).

use crate::action::ActionMask;
use crate::config::{
    ConfigCache, ConfigSource, KEY_DISABLE_EVENT_MERGE, KEY_LOG_EVENTS, KEY_LOG_EVENTS_TYPE,
    KEY_PRINT_DEBUG_LOG,
};
use crate::config_bus::DConfigSource;
use crate::control::KernelControl;
use crate::error::{Error, Result};
use crate::listener::EventListener;
use crate::mount::{MountTracker, MountWatcher};
use crate::process_log;
use crate::sink::LogSink;
use crate::worker::EventWorker;
use log::{error, info, warn};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Uid;
use parking_lot::Mutex;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default kernel module control directory.
pub const DEFAULT_CONTROL_DIR: &str = "/sys/kernel/deepin-anything/control";
/// Default event journal path.
pub const DEFAULT_LOG_PATH: &str = "/var/log/deepin/deepin-anything-logger/events.csv";

/// Cadence of both the kernel-watchdog poll and the netlink socket read
/// timeout (a 3 Hz reload watchdog cadence).
const WATCHDOG_INTERVAL: Duration = Duration::from_millis(333);

static RUNNING: AtomicBool = AtomicBool::new(true);
static RESTART_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn request_quit(_: libc::c_int) {
    RUNNING.store(false, Ordering::SeqCst);
}

fn install_signal_handlers() -> Result<()> {
    let action = SigAction::new(SigHandler::Handler(request_quit), SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGINT, &action).map_err(nix_to_io)?;
        sigaction(Signal::SIGTERM, &action).map_err(nix_to_io)?;
    }
    Ok(())
}

fn nix_to_io(err: nix::errno::Errno) -> Error {
    Error::Io(std::io::Error::from_raw_os_error(err as i32))
}

fn still_running() -> bool {
    RUNNING.load(Ordering::SeqCst)
}

/// Run the daemon to completion.
///
/// Returns the process exit code: `0` on clean shutdown, `1` if a
/// kernel-module reload requested a supervisor restart. Failures that occur
/// before the main loop starts (socket setup, config bus connect, and so on)
/// are reported as `Err` instead, per the startup-fatal row of the error
/// error taxonomy.
pub fn run(control_dir: impl AsRef<Path>, log_path: impl AsRef<Path>) -> Result<i32> {
    if !Uid::effective().is_root() {
        return Err(Error::NotRoot);
    }

    install_signal_handlers()?;

    info!(
        "waiting for kernel module control directory to appear at {:?}",
        control_dir.as_ref()
    );
    KernelControl::wait_for_module(control_dir.as_ref(), still_running);
    if !still_running() {
        return Ok(0);
    }

    let bus = DConfigSource::connect().map_err(|err| Error::ConfigBus(err.to_string()))?;
    let config = Arc::new(ConfigCache::new(Box::new(bus.clone()) as Box<dyn ConfigSource>));
    let snapshot = config.snapshot();

    process_log::set_debug(snapshot.print_debug_log);

    let sink = LogSink::new(
        log_path.as_ref().to_path_buf(),
        u64::from(snapshot.log_file_size) * 1024 * 1024,
        snapshot.log_file_count,
    )?;
    let mut worker = EventWorker::spawn(sink);

    let control = Arc::new(KernelControl::connect(control_dir.as_ref())?);
    let effective_mask = effective_mask(&snapshot);
    control.set_event_mask(effective_mask.bits());
    control.set_disable_merge(snapshot.disable_event_merge);

    let mask = Arc::new(Mutex::new(effective_mask));
    let mut listener = EventListener::new(mask.clone());

    bus.spawn_change_watcher({
        let config = Arc::clone(&config);
        let control = Arc::clone(&control);
        let mask = Arc::clone(&mask);
        move |key| {
            config.reload_key(key);
            let snapshot = config.snapshot();
            match key {
                KEY_LOG_EVENTS | KEY_LOG_EVENTS_TYPE => {
                    let new_mask = effective_mask(&snapshot);
                    *mask.lock() = new_mask;
                    control.set_event_mask(new_mask.bits());
                }
                KEY_DISABLE_EVENT_MERGE => {
                    control.set_disable_merge(snapshot.disable_event_merge);
                }
                KEY_PRINT_DEBUG_LOG => {
                    process_log::set_debug(snapshot.print_debug_log);
                }
                _ => {}
            }
        }
    });

    let mount_thread = spawn_mount_tracker(Arc::clone(&control));

    main_loop(&control, &mut listener, &worker);

    // Shutdown in reverse construction order: listener (implicit, it has no
    // background state), worker, sink (owned by the worker), config (its
    // subscription is released on drop).
    worker.shutdown();
    drop(config);
    if let Some(handle) = mount_thread {
        if handle.join().is_err() {
            warn!("mount tracker thread panicked during shutdown");
        }
    }

    if RESTART_REQUESTED.load(Ordering::SeqCst) {
        Ok(1)
    } else {
        Ok(0)
    }
}

/// The mask actually applied at the listener: `log_events_type`, or nothing
/// at all if `log_events` has been turned off wholesale.
fn effective_mask(snapshot: &crate::config::ConfigSnapshot) -> ActionMask {
    if snapshot.log_events {
        snapshot.log_events_type
    } else {
        ActionMask::EMPTY
    }
}

fn spawn_mount_tracker(control: Arc<KernelControl>) -> Option<std::thread::JoinHandle<()>> {
    let watcher = match MountWatcher::open() {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!("mount tracker disabled, failed to open /proc/self/mountinfo: {err}");
            return None;
        }
    };

    std::thread::Builder::new()
        .name("mount-tracker".to_string())
        .spawn(move || {
            let mut tracker = MountTracker::new(&control);
            tracker.refresh();
            while watcher.wait_for_change(still_running) {
                tracker.refresh();
            }
        })
        .ok()
}

/// Single-threaded cooperative main loop: drives netlink socket readiness,
/// the kernel-reload watchdog, and (implicitly, through the `RUNNING` flag)
/// signal delivery. Exits when a signal handler clears `RUNNING` or the
/// watchdog observes a kernel module reload.
fn main_loop(control: &KernelControl, listener: &mut EventListener, worker: &EventWorker) {
    let fd = control.socket().as_raw_fd();
    let handle = worker.handle();
    let mut buf = [0u8; 8192];

    while still_running() {
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout_ms = WATCHDOG_INTERVAL.as_millis() as libc::c_int;
        let rc = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };

        if rc > 0 && pollfd.revents & libc::POLLIN != 0 {
            match control.socket().recv(&mut buf) {
                Ok(len) => listener.handle_frame(&buf[..len], |event| handle.push(event)),
                Err(err) => warn!("netlink recv failed: {err}"),
            }
        } else if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() != std::io::ErrorKind::Interrupted {
                warn!("poll on netlink socket failed: {err}");
            }
        }

        if control.reloaded() {
            error!("kernel module reload detected, requesting a supervisor restart");
            RESTART_REQUESTED.store(true, Ordering::SeqCst);
            RUNNING.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::config::ConfigSnapshot;

    #[test]
    fn effective_mask_is_empty_when_log_events_disabled() {
        let mut snapshot = ConfigSnapshot::default();
        snapshot.log_events = false;
        snapshot.log_events_type = ActionMask::EMPTY.with(Action::NewFile);
        assert_eq!(effective_mask(&snapshot), ActionMask::EMPTY);
    }

    #[test]
    fn effective_mask_passes_through_when_log_events_enabled() {
        let mut snapshot = ConfigSnapshot::default();
        snapshot.log_events = true;
        snapshot.log_events_type = ActionMask::EMPTY.with(Action::NewFile);
        assert!(effective_mask(&snapshot).contains(Action::NewFile));
    }
}
