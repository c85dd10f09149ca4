//! Dynamic configuration cache.
//!
//! The cache holds a typed, validated snapshot of a small fixed key set read
//! from an external configuration bus. Coercion and clamping happen here;
//! the bus itself is modelled behind [`ConfigSource`] so the cache's
//! validation logic can be exercised without a running bus connection.

use crate::action::{Action, ActionMask};
use log::warn;
use std::collections::HashMap;
use std::time::Duration;

pub const KEY_LOG_EVENTS: &str = "log_events";
pub const KEY_LOG_EVENTS_TYPE: &str = "log_events_type";
pub const KEY_LOG_FILE_COUNT: &str = "log_file_count";
pub const KEY_LOG_FILE_SIZE: &str = "log_file_size";
pub const KEY_PRINT_DEBUG_LOG: &str = "print_debug_log";
pub const KEY_DISABLE_EVENT_MERGE: &str = "disable_event_merge";

const ALL_KEYS: &[&str] = &[
    KEY_LOG_EVENTS,
    KEY_LOG_EVENTS_TYPE,
    KEY_LOG_FILE_COUNT,
    KEY_LOG_FILE_SIZE,
    KEY_PRINT_DEBUG_LOG,
    KEY_DISABLE_EVENT_MERGE,
];

/// A value as it comes off the bus, before key-specific coercion.
#[derive(Clone, Debug)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    StringList(Vec<String>),
}

/// Anything that can answer "what is the current value of this key",
/// one key at a time. The production implementation is [`DConfigSource`];
/// tests substitute a plain lookup table.
pub trait ConfigSource: Send + Sync {
    /// Fetch the raw value of `key`, or `None` if the bus could not answer
    /// within the cache's timeout (counts as a per-key failure).
    fn fetch(&self, key: &str) -> Option<RawValue>;
}

/// The validated, typed view of configuration the rest of the daemon reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConfigSnapshot {
    pub log_events: bool,
    pub log_events_type: ActionMask,
    pub log_file_count: u32,
    pub log_file_size: u32,
    pub print_debug_log: bool,
    pub disable_event_merge: bool,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        ConfigSnapshot {
            log_events: true,
            log_events_type: ActionMask::default_mask(),
            log_file_count: 10,
            log_file_size: 50,
            print_debug_log: false,
            disable_event_merge: false,
        }
    }
}

/// Typed, cached, change-notified configuration.
///
/// The cache owns the bus subscription for its entire lifetime (dropping it
/// releases the subscription). Reads come from the cached snapshot, never
/// the bus directly, so a slow or unreachable bus cannot stall the main loop.
pub struct ConfigCache {
    source: Box<dyn ConfigSource>,
    snapshot: parking_lot::Mutex<ConfigSnapshot>,
}

impl ConfigCache {
    pub fn new(source: Box<dyn ConfigSource>) -> ConfigCache {
        let mut cache = ConfigCache {
            source,
            snapshot: parking_lot::Mutex::new(ConfigSnapshot::default()),
        };
        cache.load_all();
        cache
    }

    /// Load every recognized key from the bus, falling back to the default
    /// for any key the bus could not answer.
    pub fn load_all(&mut self) {
        let mut snapshot = ConfigSnapshot::default();
        for key in ALL_KEYS {
            apply_key(&*self.source, key, &mut snapshot);
        }
        *self.snapshot.lock() = snapshot;
    }

    /// Re-fetch and re-validate a single key in response to a change
    /// notification, leaving the rest of the snapshot untouched.
    pub fn reload_key(&self, key: &str) {
        if !ALL_KEYS.contains(&key) {
            warn!("ignoring change notification for unrecognized config key '{key}'");
            return;
        }
        let mut snapshot = *self.snapshot.lock();
        apply_key(&*self.source, key, &mut snapshot);
        *self.snapshot.lock() = snapshot;
    }

    /// A consistent copy of the current configuration.
    pub fn snapshot(&self) -> ConfigSnapshot {
        *self.snapshot.lock()
    }

    /// `config_get_boolean` over the enumerated key set; unknown keys return
    /// `false` with a warning.
    pub fn get_boolean(&self, key: &str) -> bool {
        let snapshot = self.snapshot();
        match key {
            KEY_LOG_EVENTS => snapshot.log_events,
            KEY_PRINT_DEBUG_LOG => snapshot.print_debug_log,
            KEY_DISABLE_EVENT_MERGE => snapshot.disable_event_merge,
            _ => {
                warn!("config_get_boolean: unrecognized key '{key}'");
                false
            }
        }
    }

    /// `config_get_uint` over the enumerated key set; unknown keys return
    /// `0` with a warning.
    pub fn get_uint(&self, key: &str) -> u32 {
        let snapshot = self.snapshot();
        match key {
            KEY_LOG_FILE_COUNT => snapshot.log_file_count,
            KEY_LOG_FILE_SIZE => snapshot.log_file_size,
            _ => {
                warn!("config_get_uint: unrecognized key '{key}'");
                0
            }
        }
    }
}

fn apply_key(source: &dyn ConfigSource, key: &str, snapshot: &mut ConfigSnapshot) {
    let Some(raw) = source.fetch(key) else {
        warn!("config key '{key}' unavailable, keeping previous/default value");
        return;
    };

    match key {
        KEY_LOG_EVENTS => {
            if let Some(value) = coerce_bool(&raw) {
                snapshot.log_events = value;
            } else {
                warn!("config key '{key}' has an unexpected type, ignoring");
            }
        }
        KEY_DISABLE_EVENT_MERGE => {
            if let Some(value) = coerce_bool(&raw) {
                snapshot.disable_event_merge = value;
            } else {
                warn!("config key '{key}' has an unexpected type, ignoring");
            }
        }
        KEY_PRINT_DEBUG_LOG => {
            if let Some(value) = coerce_bool(&raw) {
                snapshot.print_debug_log = value;
            } else {
                warn!("config key '{key}' has an unexpected type, ignoring");
            }
        }
        KEY_LOG_FILE_COUNT => match coerce_uint(&raw) {
            Some(value) => snapshot.log_file_count = value.clamp(1, 20),
            None => warn!("config key '{key}' has an unexpected type, ignoring"),
        },
        KEY_LOG_FILE_SIZE => match coerce_uint(&raw) {
            Some(value) => snapshot.log_file_size = value.clamp(1, 100),
            None => warn!("config key '{key}' has an unexpected type, ignoring"),
        },
        KEY_LOG_EVENTS_TYPE => match coerce_action_mask(&raw) {
            Some(mask) => snapshot.log_events_type = mask,
            None => warn!("config key '{key}' has an unexpected type, ignoring"),
        },
        _ => unreachable!("apply_key called with an unrecognized key"),
    }
}

fn coerce_bool(raw: &RawValue) -> Option<bool> {
    match raw {
        RawValue::Bool(b) => Some(*b),
        RawValue::Int(i) => Some(*i != 0),
        _ => None,
    }
}

/// Accepts int32, int64 (range-checked) or double (range-checked, truncated).
fn coerce_uint(raw: &RawValue) -> Option<u32> {
    match raw {
        RawValue::Int(i) => u32::try_from(*i).ok(),
        RawValue::Double(d) => {
            if d.is_finite() && *d >= 0.0 && *d <= u32::MAX as f64 {
                Some(*d as u32)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// A string array (or array-of-variant-of-string) of action name tokens.
/// Elements that are not recognized action names are skipped with a
/// warning rather than failing the whole key.
fn coerce_action_mask(raw: &RawValue) -> Option<ActionMask> {
    let RawValue::StringList(tokens) = raw else {
        return None;
    };
    let mut mask = ActionMask::EMPTY;
    for token in tokens {
        match Action::from_token(token) {
            Some(action) => mask = mask.with(action),
            None => warn!("ignoring unrecognized action token '{token}' in log_events_type"),
        }
    }
    Some(mask)
}

/// Run `call` on a worker thread and wait up to one second for it to
/// complete, bounded to a 1-second call budget. A timeout
/// returns `None` rather than blocking the caller indefinitely.
pub(crate) fn call_with_timeout<T: Send + 'static>(
    call: impl FnOnce() -> Option<T> + Send + 'static,
) -> Option<T> {
    let (sender, receiver) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let _ = sender.send(call());
    });
    receiver.recv_timeout(Duration::from_secs(1)).ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSource {
        values: HashMap<&'static str, RawValue>,
    }

    impl ConfigSource for StubSource {
        fn fetch(&self, key: &str) -> Option<RawValue> {
            self.values.get(key).cloned()
        }
    }

    fn stub(values: &[(&'static str, RawValue)]) -> Box<dyn ConfigSource> {
        Box::new(StubSource {
            values: values.iter().cloned().collect(),
        })
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cache = ConfigCache::new(stub(&[]));
        assert_eq!(cache.snapshot(), ConfigSnapshot::default());
    }

    #[test]
    fn log_file_count_clamps_above_twenty() {
        let cache = ConfigCache::new(stub(&[(KEY_LOG_FILE_COUNT, RawValue::Int(500))]));
        assert_eq!(cache.snapshot().log_file_count, 20);
    }

    #[test]
    fn log_file_size_clamps_above_hundred() {
        let cache = ConfigCache::new(stub(&[(KEY_LOG_FILE_SIZE, RawValue::Double(9999.0))]));
        assert_eq!(cache.snapshot().log_file_size, 100);
    }

    #[test]
    fn zero_and_negative_inputs_stay_within_the_floor() {
        let cache = ConfigCache::new(stub(&[(KEY_LOG_FILE_COUNT, RawValue::Int(0))]));
        assert_eq!(cache.snapshot().log_file_count, 1);
    }

    #[test]
    fn string_list_coerces_to_action_mask() {
        let cache = ConfigCache::new(stub(&[(
            KEY_LOG_EVENTS_TYPE,
            RawValue::StringList(vec!["file-created".to_string(), "not-a-real-action".to_string()]),
        )]));
        let mask = cache.snapshot().log_events_type;
        assert!(mask.contains(Action::NewFile));
        assert!(!mask.contains(Action::DelFile));
    }

    #[test]
    fn reload_key_only_touches_that_key() {
        let mut cache = ConfigCache::new(stub(&[(KEY_LOG_EVENTS, RawValue::Bool(true))]));
        cache.source = stub(&[(KEY_LOG_EVENTS, RawValue::Bool(false))]);
        cache.reload_key(KEY_LOG_EVENTS);
        assert!(!cache.snapshot().log_events);
        assert_eq!(cache.snapshot().log_file_size, 50);
    }

    #[test]
    fn get_boolean_warns_and_defaults_on_unknown_key() {
        let cache = ConfigCache::new(stub(&[]));
        assert!(!cache.get_boolean("not_a_real_key"));
    }
}
