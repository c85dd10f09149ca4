//! The external configuration bus binding for [`crate::config::ConfigCache`].
//!
//! The bus itself (a dconfig-like service reached over the system D-Bus) is
//! an external collaborator; this module only needs to get values in and
//! change notifications out, both through `zbus`'s blocking client, since
//! the daemon's main loop is synchronous.

use crate::config::{call_with_timeout, ConfigSource, RawValue};
use log::warn;
use zbus::blocking::Connection;
use zbus::zvariant::{OwnedValue, Value};

const SERVICE_NAME: &str = "org.desktop.DConfig";
const MANAGER_PATH: &str = "/";
const MANAGER_INTERFACE: &str = "org.desktop.DConfig.Manager";

#[zbus::proxy(
    interface = "org.desktop.DConfig.Manager",
    default_service = "org.desktop.DConfig",
    default_path = "/"
)]
trait DConfigManager {
    fn value(&self, key: &str) -> zbus::Result<OwnedValue>;

    #[zbus(signal)]
    fn value_changed(&self, key: String) -> zbus::Result<()>;
}

/// A [`ConfigSource`] backed by a real dconfig-like D-Bus service.
///
/// Cheap to clone: the underlying proxy just carries a connection handle, so
/// the lifecycle glue can hand one copy to the [`crate::config::ConfigCache`]
/// and keep another for [`DConfigSource::spawn_change_watcher`].
#[derive(Clone)]
pub struct DConfigSource {
    proxy: DConfigManagerProxyBlocking<'static>,
}

impl DConfigSource {
    pub fn connect() -> zbus::Result<DConfigSource> {
        let connection = Connection::system()?;
        let proxy = DConfigManagerProxyBlocking::builder(&connection)
            .destination(SERVICE_NAME)?
            .path(MANAGER_PATH)?
            .interface(MANAGER_INTERFACE)?
            .build()?;
        Ok(DConfigSource { proxy })
    }

    /// Spawn a thread that blocks on the bus's `value_changed` signal and
    /// invokes `on_change` synchronously, from that thread, for each
    /// notification, invoked synchronously from the bus delivery thread.
    pub fn spawn_change_watcher(&self, on_change: impl Fn(&str) + Send + 'static) {
        let proxy = self.proxy.clone();
        std::thread::Builder::new()
            .name("config-bus-watcher".to_string())
            .spawn(move || {
                let stream = match proxy.receive_value_changed() {
                    Ok(stream) => stream,
                    Err(err) => {
                        warn!("failed to subscribe to config change notifications: {err}");
                        return;
                    }
                };
                for signal in stream {
                    match signal.args() {
                        Ok(args) => on_change(&args.key),
                        Err(err) => warn!("malformed config change notification: {err}"),
                    }
                }
            })
            .expect("failed to spawn config bus watcher thread");
    }
}

impl ConfigSource for DConfigSource {
    fn fetch(&self, key: &str) -> Option<RawValue> {
        let proxy = self.proxy.clone();
        let key = key.to_string();
        call_with_timeout(move || {
            let value = proxy.value(&key).ok()?;
            owned_to_raw(value)
        })
    }
}

fn owned_to_raw(value: OwnedValue) -> Option<RawValue> {
    let value: Value = value.into();
    match value {
        Value::Bool(b) => Some(RawValue::Bool(b)),
        Value::I16(v) => Some(RawValue::Int(v as i64)),
        Value::U16(v) => Some(RawValue::Int(v as i64)),
        Value::I32(v) => Some(RawValue::Int(v as i64)),
        Value::U32(v) => Some(RawValue::Int(v as i64)),
        Value::I64(v) => Some(RawValue::Int(v)),
        Value::U64(v) => Some(RawValue::Int(v as i64)),
        Value::F64(v) => Some(RawValue::Double(v)),
        Value::Str(s) => Some(RawValue::StringList(vec![s.to_string()])),
        Value::Array(array) => {
            let mut items = Vec::new();
            for element in array.iter() {
                match <&str>::try_from(element) {
                    Ok(s) => items.push(s.to_string()),
                    Err(_) => warn!("skipping non-string element in a config array value"),
                }
            }
            Some(RawValue::StringList(items))
        }
        _ => None,
    }
}
