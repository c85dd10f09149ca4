//! Event worker: rename-pair correlation, CSV formatting, and ordered
//! hand-off to the log sink.

use crate::action::Action;
use crate::csv_line::{rename_event_line, single_event_line};
use crate::event::{FileEvent, WorkerMessage};
use crate::sink::LogSink;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::warn;
use std::collections::HashMap;
use std::thread::JoinHandle;

/// Queue depth for the worker's inbox. Push never blocks the producer
/// (the listener, running on the main loop); a full queue drops the event
/// with a warning rather than stall frame decoding.
const QUEUE_CAPACITY: usize = 4096;

/// Producer-side handle held by the listener / main loop.
#[derive(Clone)]
pub struct WorkerHandle {
    sender: Sender<WorkerMessage>,
}

impl WorkerHandle {
    /// Enqueue an event. Never blocks; a full queue drops the event and logs
    /// a warning, since the alternative is stalling the frame decoder.
    pub fn push(&self, event: FileEvent) {
        match self.sender.try_send(WorkerMessage::Event(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("event worker queue is full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("event worker is no longer running, dropping event");
            }
        }
    }

    /// Signal the worker to drain and stop.
    pub fn terminate(&self) {
        // A terminate sentinel always gets a slot: if the bounded queue is
        // full of live events we still want shutdown to make progress, so
        // this is a blocking send rather than `try_send`.
        if self.sender.send(WorkerMessage::Terminate).is_err() {
            warn!("event worker channel already closed");
        }
    }
}

/// Owns the dedicated worker thread and the join handle used to wait for it
/// to drain on shutdown.
pub struct EventWorker {
    handle: WorkerHandle,
    join: Option<JoinHandle<()>>,
}

impl EventWorker {
    /// Spawn the worker thread, which owns `sink` for its entire lifetime.
    pub fn spawn(sink: LogSink) -> EventWorker {
        let (sender, receiver) = crossbeam_channel::bounded(QUEUE_CAPACITY);
        let join = std::thread::Builder::new()
            .name("event-worker".to_string())
            .spawn(move || run_worker(receiver, sink))
            .expect("failed to spawn event worker thread");

        EventWorker {
            handle: WorkerHandle { sender },
            join: Some(join),
        }
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Push the terminate sentinel and block until the worker has drained
    /// and exited. Idempotent: calling this twice is a no-op the second time.
    pub fn shutdown(&mut self) {
        if let Some(join) = self.join.take() {
            self.handle.terminate();
            if join.join().is_err() {
                warn!("event worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for EventWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(receiver: Receiver<WorkerMessage>, mut sink: LogSink) {
    let mut pending_renames: HashMap<u32, FileEvent> = HashMap::new();

    while let Ok(message) = receiver.recv() {
        match message {
            WorkerMessage::Terminate => break,
            WorkerMessage::Event(event) => {
                if event.action.is_rename() {
                    handle_rename(&mut pending_renames, event, &mut sink);
                } else {
                    let line = single_event_line(
                        &event.process_path,
                        event.uid,
                        event.pid,
                        event.action.csv_name(),
                        &event.event_path,
                    );
                    sink.write_line(&line);
                }
            }
        }
    }
    // Any rename-from entries that never saw their partner are released here
    // without emitting a line -- the pending map has no timeout or eviction,
    // so this drain is the only place they are ever freed short of a match.
}

fn handle_rename(pending: &mut HashMap<u32, FileEvent>, event: FileEvent, sink: &mut LogSink) {
    match pending.remove(&event.cookie) {
        None => {
            if event.action.is_rename_from() {
                pending.insert(event.cookie, event);
            }
            // An unpaired rename-to with no prior rename-from is dropped.
        }
        Some(prev) => {
            if prev.action.is_rename_from() && event.action.is_rename_to() {
                let action_name = rename_pair_name(event.action);
                let line = rename_event_line(
                    &event.process_path,
                    event.uid,
                    event.pid,
                    action_name,
                    &prev.event_path,
                    &event.event_path,
                );
                sink.write_line(&line);
            }
            // A mismatched pair kind (e.g. two rename-from events sharing a
            // cookie) drops both halves silently.
        }
    }
}

fn rename_pair_name(action: Action) -> &'static str {
    action.csv_name()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Device;
    use crate::sink::LogSink;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn make_event(action: Action, cookie: u32, path: &str) -> FileEvent {
        FileEvent {
            action,
            cookie,
            device: Device { major: 8, minor: 1 },
            event_path: PathBuf::from(path),
            uid: 1000,
            pid: 42,
            process_path: PathBuf::from("/bin/mv"),
        }
    }

    #[test]
    fn rename_pair_emits_one_line() {
        let dir = tempdir().unwrap();
        let mut sink = LogSink::new(dir.path().join("events.csv"), 50, 10).unwrap();
        let mut pending = HashMap::new();

        handle_rename(
            &mut pending,
            make_event(Action::RenameFromFile, 7, "/x/old"),
            &mut sink,
        );
        assert!(pending.contains_key(&7));

        handle_rename(
            &mut pending,
            make_event(Action::RenameToFile, 7, "/x/new"),
            &mut sink,
        );
        assert!(pending.is_empty());

        let content = std::fs::read_to_string(dir.path().join("events.csv")).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.trim_end().ends_with(",file-renamed,/x/old,/x/new"));
    }

    #[test]
    fn orphan_rename_to_emits_nothing() {
        let dir = tempdir().unwrap();
        let mut sink = LogSink::new(dir.path().join("events.csv"), 50, 10).unwrap();
        let mut pending = HashMap::new();

        handle_rename(
            &mut pending,
            make_event(Action::RenameToFile, 99, "/x/new"),
            &mut sink,
        );

        assert!(pending.is_empty());
        let content = std::fs::read_to_string(dir.path().join("events.csv")).unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn unpaired_rename_from_remains_pending() {
        let mut pending = HashMap::new();
        let dir = tempdir().unwrap();
        let mut sink = LogSink::new(dir.path().join("events.csv"), 50, 10).unwrap();
        handle_rename(
            &mut pending,
            make_event(Action::RenameFromFile, 1, "/x/old"),
            &mut sink,
        );
        assert_eq!(pending.len(), 1);
    }
}
