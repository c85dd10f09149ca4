//! Event listener: decodes kernel multicast frames into [`FileEvent`]s.

use crate::action::{Action, ActionMask};
use crate::event::{Device, FileEvent};
use crate::netlink::{self, attr_i32, attr_u16, attr_u8};
use log::{debug, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

const CMD_NOTIFY: u8 = 1;
const CMD_NOTIFY_PROCESS_INFO: u8 = 2;

const ATTR_ACTION: u16 = 1;
const ATTR_COOKIE: u16 = 2;
const ATTR_MAJOR: u16 = 3;
const ATTR_MINOR: u16 = 4;
const ATTR_PATH: u16 = 5;
const ATTR_UID: u16 = 6;
const ATTR_TGID: u16 = 7;

/// A `NOTIFY` half seen but not yet joined with its `NOTIFY_PROCESS_INFO`
/// counterpart.
#[derive(Clone)]
struct PartialEvent {
    action: Action,
    cookie: u32,
    device: Device,
    event_path: PathBuf,
}

/// Decodes kernel frames into [`FileEvent`]s and hands completed events to a
/// consumer callback.
///
/// The listener itself holds only the current event mask and the single
/// in-flight partial event -- both guarded by a lock since the mask can be
/// rewritten from the main loop's config-change callback while a frame is
/// mid-decode.
pub struct EventListener {
    mask: Arc<Mutex<ActionMask>>,
    partial: Option<PartialEvent>,
}

impl EventListener {
    pub fn new(mask: Arc<Mutex<ActionMask>>) -> EventListener {
        EventListener {
            mask,
            partial: None,
        }
    }

    /// Returns a clone of the shared mask handle, used by the lifecycle glue
    /// to reprogram the mask on a config-change callback.
    pub fn mask_handle(&self) -> Arc<Mutex<ActionMask>> {
        self.mask.clone()
    }

    /// Decode one datagram and, if it completes an event that passes the
    /// mask, invoke `on_event`. Frame decode errors, missing attributes and
    /// unknown commands are logged and the frame is dropped -- never fatal.
    pub fn handle_frame(&mut self, buf: &[u8], mut on_event: impl FnMut(FileEvent)) {
        let frame = match netlink::parse_genl_frame(buf) {
            Some(frame) => frame,
            None => {
                debug!("dropping undecodable netlink frame ({} bytes)", buf.len());
                return;
            }
        };

        match frame.cmd {
            CMD_NOTIFY => self.handle_notify(frame.attrs),
            CMD_NOTIFY_PROCESS_INFO => self.handle_process_info(frame.attrs, on_event),
            other => warn!("unknown netlink command {other}, skipping frame"),
        }
    }

    fn handle_notify(&mut self, attrs: netlink::GenlAttrs<'_>) {
        if self.partial.is_some() {
            debug!(
                "new NOTIFY arrived while a partial event was in flight; \
                 discarding it (kernel-side merge or socket overflow)"
            );
            self.partial = None;
        }

        let mut action = None;
        let mut cookie = None;
        let mut major = None;
        let mut minor = None;
        let mut path = None;

        for (kind, payload) in attrs {
            match kind {
                ATTR_ACTION => action = attr_u8(payload).and_then(Action::from_wire),
                ATTR_COOKIE => cookie = netlink::attr_u32(payload),
                ATTR_MAJOR => major = attr_u16(payload),
                ATTR_MINOR => minor = attr_u8(payload),
                ATTR_PATH => path = netlink::attr_cstr(payload).map(PathBuf::from),
                _ => {}
            }
        }

        let (Some(action), Some(cookie), Some(major), Some(minor), Some(event_path)) =
            (action, cookie, major, minor, path)
        else {
            debug!("NOTIFY frame missing a required attribute, skipping");
            return;
        };

        self.partial = Some(PartialEvent {
            action,
            cookie,
            device: Device { major, minor },
            event_path,
        });
    }

    fn handle_process_info(
        &mut self,
        attrs: netlink::GenlAttrs<'_>,
        mut on_event: impl FnMut(FileEvent),
    ) {
        let Some(partial) = self.partial.take() else {
            debug!("orphan NOTIFY_PROCESS_INFO with no partial event in flight, dropping");
            return;
        };

        let mut uid = None;
        let mut pid = None;
        let mut process_path = None;

        for (kind, payload) in attrs {
            match kind {
                ATTR_UID => uid = netlink::attr_u32(payload),
                ATTR_TGID => pid = attr_i32(payload),
                ATTR_PATH => process_path = netlink::attr_cstr(payload).map(PathBuf::from),
                _ => {}
            }
        }

        let (Some(uid), Some(pid), Some(process_path)) = (uid, pid, process_path) else {
            debug!("NOTIFY_PROCESS_INFO frame missing a required attribute, skipping");
            return;
        };

        if !self.mask.lock().contains(partial.action) {
            // Masked out between NOTIFY and PROCESS_INFO: costs only CPU,
            // never downstream queue capacity.
            return;
        }

        let event = FileEvent {
            action: partial.action,
            cookie: partial.cookie,
            device: partial.device,
            event_path: partial.event_path,
            uid,
            pid,
            process_path,
        };

        if !event.is_valid() {
            warn!("discarding invalid FileEvent: {event:?}");
            return;
        }

        on_event(event);
    }
}
