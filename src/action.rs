//! The closed set of VFS actions the kernel module can report.
//!
//! Every action has a stable bit position (used by the event mask sent to the
//! kernel module and cached in configuration) and a canonical string used both
//! in the CSV journal and in the `log_events_type` configuration value.

use std::fmt;

/// A single VFS action as reported by the kernel module.
///
/// The numeric values match the wire encoding used by `NOTIFY` frames and
/// double as bit positions in the 32-bit action mask.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Action {
    NewFile = 0,
    NewLink = 1,
    NewSymlink = 2,
    NewFolder = 3,
    DelFile = 4,
    DelFolder = 5,
    RenameFromFile = 6,
    RenameToFile = 7,
    RenameFromFolder = 8,
    RenameToFolder = 9,
    FsMount = 10,
    FsUnmount = 11,
}

impl Action {
    /// All actions that can legitimately appear on the wire, in bit order.
    pub const ALL: &'static [Action] = &[
        Action::NewFile,
        Action::NewLink,
        Action::NewSymlink,
        Action::NewFolder,
        Action::DelFile,
        Action::DelFolder,
        Action::RenameFromFile,
        Action::RenameToFile,
        Action::RenameFromFolder,
        Action::RenameToFolder,
        Action::FsMount,
        Action::FsUnmount,
    ];

    /// Decode a raw action byte from a `NOTIFY` frame. Returns `None` for any
    /// value outside the known set (treated as the `invalid` sentinel).
    pub fn from_wire(value: u8) -> Option<Action> {
        Action::ALL.iter().copied().find(|a| *a as u8 == value)
    }

    /// Bit position of this action within the 32-bit event mask.
    pub fn mask_bit(self) -> u32 {
        1u32 << (self as u8)
    }

    /// Canonical name used in the CSV journal and in `log_events_type` values.
    ///
    /// `rename-from-*` and `rename-to-*` share a name with their counterpart
    /// since a completed rename emits a single combined line.
    pub fn csv_name(self) -> &'static str {
        match self {
            Action::NewFile => "file-created",
            Action::NewLink => "link-created",
            Action::NewSymlink => "symlink-created",
            Action::NewFolder => "folder-created",
            Action::DelFile => "file-deleted",
            Action::DelFolder => "folder-deleted",
            Action::RenameFromFile | Action::RenameToFile => "file-renamed",
            Action::RenameFromFolder | Action::RenameToFolder => "folder-renamed",
            Action::FsMount => "fs-mounted",
            Action::FsUnmount => "fs-unmounted",
        }
    }

    /// True for the four actions that participate in rename-pair correlation.
    pub fn is_rename(self) -> bool {
        matches!(
            self,
            Action::RenameFromFile
                | Action::RenameToFile
                | Action::RenameFromFolder
                | Action::RenameToFolder
        )
    }

    /// True for the `rename-from-*` half of a pair.
    pub fn is_rename_from(self) -> bool {
        matches!(self, Action::RenameFromFile | Action::RenameFromFolder)
    }

    /// True for the `rename-to-*` half of a pair.
    pub fn is_rename_to(self) -> bool {
        matches!(self, Action::RenameToFile | Action::RenameToFolder)
    }

    /// Parse a `log_events_type` configuration token back into an action.
    pub fn from_token(token: &str) -> Option<Action> {
        Action::ALL.iter().copied().find(|a| a.csv_name() == token)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.csv_name())
    }
}

/// A 32-bit bitmap indexed by [`Action`] bit position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ActionMask(u32);

impl ActionMask {
    pub const EMPTY: ActionMask = ActionMask(0);

    /// The default mask: only deletions are logged until configuration says otherwise.
    pub fn default_mask() -> ActionMask {
        ActionMask::EMPTY
            .with(Action::DelFile)
            .with(Action::DelFolder)
    }

    pub fn from_bits(bits: u32) -> ActionMask {
        ActionMask(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn with(self, action: Action) -> ActionMask {
        ActionMask(self.0 | action.mask_bit())
    }

    pub fn contains(self, action: Action) -> bool {
        self.0 & action.mask_bit() != 0
    }

    pub fn set(&mut self, action: Action, enabled: bool) {
        if enabled {
            self.0 |= action.mask_bit();
        } else {
            self.0 &= !action.mask_bit();
        }
    }
}

impl Default for ActionMask {
    fn default() -> Self {
        ActionMask::default_mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_wire_values() {
        for action in Action::ALL {
            assert_eq!(Action::from_wire(*action as u8), Some(*action));
        }
        assert_eq!(Action::from_wire(255), None);
    }

    #[test]
    fn rename_pair_names_collapse() {
        assert_eq!(Action::RenameFromFile.csv_name(), "file-renamed");
        assert_eq!(Action::RenameToFile.csv_name(), "file-renamed");
        assert_eq!(Action::RenameFromFolder.csv_name(), "folder-renamed");
        assert_eq!(Action::RenameToFolder.csv_name(), "folder-renamed");
    }

    #[test]
    fn default_mask_only_covers_deletes() {
        let mask = ActionMask::default_mask();
        assert!(mask.contains(Action::DelFile));
        assert!(mask.contains(Action::DelFolder));
        assert!(!mask.contains(Action::NewFile));
    }

    #[test]
    fn mask_set_toggles_bits() {
        let mut mask = ActionMask::EMPTY;
        mask.set(Action::NewFile, true);
        assert!(mask.contains(Action::NewFile));
        mask.set(Action::NewFile, false);
        assert!(!mask.contains(Action::NewFile));
    }

    #[test]
    fn token_round_trip() {
        for action in Action::ALL {
            if let Some(parsed) = Action::from_token(action.csv_name()) {
                assert_eq!(parsed.csv_name(), action.csv_name());
            }
        }
        assert_eq!(Action::from_token("not-a-real-action"), None);
    }
}
