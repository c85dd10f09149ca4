//! RFC 4180 field escaping and the two journal line shapes.

use chrono::Local;
use std::fmt::Write as _;
use std::path::Path;

/// Escape a single CSV field. Fields containing `,`, `"`, `\n` or `\r` are
/// wrapped in double quotes with internal quotes doubled; everything else is
/// emitted verbatim.
pub fn escape_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        let mut out = String::with_capacity(value.len() + 2);
        out.push('"');
        for ch in value.chars() {
            if ch == '"' {
                out.push('"');
            }
            out.push(ch);
        }
        out.push('"');
        out
    } else {
        value.to_string()
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Render a single-path event line: `<ts>,<process_path>,<uid>,<pid>,<action>,<path>\n`.
///
/// The timestamp is taken at format time (worker time), not when the kernel
/// produced the event -- acceptable for a forensic log, but worth recording
/// explicitly since it means CSV ordering and wall-clock ordering can drift
/// slightly under load.
pub fn single_event_line(
    process_path: &Path,
    uid: u32,
    pid: i32,
    action_name: &str,
    event_path: &Path,
) -> String {
    let mut line = String::new();
    let _ = write!(
        line,
        "{},{},{},{},{},{}\n",
        timestamp(),
        escape_field(&process_path.to_string_lossy()),
        uid,
        pid,
        action_name,
        escape_field(&event_path.to_string_lossy()),
    );
    line
}

/// Render a combined rename line:
/// `<ts>,<process_path>,<uid>,<pid>,<action>,<from_path>,<to_path>\n`.
pub fn rename_event_line(
    process_path: &Path,
    uid: u32,
    pid: i32,
    action_name: &str,
    from_path: &Path,
    to_path: &Path,
) -> String {
    let mut line = String::new();
    let _ = write!(
        line,
        "{},{},{},{},{},{},{}\n",
        timestamp(),
        escape_field(&process_path.to_string_lossy()),
        uid,
        pid,
        action_name,
        escape_field(&from_path.to_string_lossy()),
        escape_field(&to_path.to_string_lossy()),
    );
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn unaffected_fields_are_verbatim() {
        assert_eq!(escape_field("/tmp/a"), "/tmp/a");
    }

    #[test]
    fn comma_quote_and_newline_trigger_quoting() {
        assert_eq!(escape_field(r#"/tmp/a,b"c"#), "\"/tmp/a,b\"\"c\"");
        assert_eq!(escape_field("/tmp/a\nb"), "\"/tmp/a\nb\"");
    }

    #[test]
    fn single_event_line_has_six_fields() {
        let line = single_event_line(
            &PathBuf::from("/usr/bin/touch"),
            1000,
            42,
            "file-created",
            &PathBuf::from("/tmp/a"),
        );
        assert!(line.ends_with(",file-created,/tmp/a\n"));
        assert!(line.contains(",/usr/bin/touch,1000,42,"));
    }

    #[test]
    fn rename_line_has_seven_fields() {
        let line = rename_event_line(
            &PathBuf::from("/bin/mv"),
            0,
            7,
            "file-renamed",
            &PathBuf::from("/x/old"),
            &PathBuf::from("/x/new"),
        );
        assert!(line.ends_with(",file-renamed,/x/old,/x/new\n"));
    }
}
