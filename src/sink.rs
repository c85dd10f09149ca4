//! Rotating, gzip-archiving log sink.

use flate2::write::GzEncoder;
use flate2::Compression;
use log::warn;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Bound on how many stale archive generations the hygiene step will scan
/// past `max_file_count` looking for leftovers to unlink.
const HYGIENE_SCAN_LIMIT: u32 = 100;

/// A size-bounded, append-only log file with ordered gzip-compressed
/// archival of rotated generations.
pub struct LogSink {
    base_path: PathBuf,
    max_file_size: u64,
    max_file_count: u32,
    current_file: Option<File>,
    current_file_size: u64,
    /// Set once a rotation aborts mid-sequence. The sink keeps running but
    /// every subsequent write is a no-op until the daemon is restarted --
    /// see the design note on rotation failure in DESIGN.md.
    disabled: bool,
}

impl LogSink {
    /// Open (creating if necessary) the live log file at `base_path`,
    /// creating its parent directory (mode 0755) if needed.
    ///
    /// `max_file_size` is in bytes; `max_file_count` bounds the number of
    /// `.gz` archives kept alongside the live file.
    pub fn new(
        base_path: impl Into<PathBuf>,
        max_file_size: u64,
        max_file_count: u32,
    ) -> io::Result<LogSink> {
        let base_path = base_path.into();
        if let Some(parent) = base_path.parent() {
            fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = fs::metadata(parent)?.permissions();
                perms.set_mode(0o755);
                fs::set_permissions(parent, perms)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&base_path)?;
        let current_file_size = file.metadata()?.len();

        Ok(LogSink {
            base_path,
            max_file_size,
            max_file_count,
            current_file: Some(file),
            current_file_size,
            disabled: false,
        })
    }

    fn archive_path(&self, generation: u32) -> PathBuf {
        let mut name = self.base_path.clone().into_os_string();
        name.push(format!(".{generation}.gz"));
        PathBuf::from(name)
    }

    /// Append `line` (already newline-terminated), rotating first if the
    /// live file is already past the size threshold. A write/flush failure
    /// is logged and the sink keeps running on the same stream; a rotation
    /// failure disables the sink entirely (see [`LogSink::disabled`]).
    pub fn write_line(&mut self, line: &str) {
        if self.disabled {
            return;
        }

        if self.current_file_size > self.max_file_size {
            if let Err(err) = self.rotate() {
                warn!("log rotation failed, no further lines will be written until restart: {err}");
                self.disabled = true;
                return;
            }
        }

        let Some(file) = self.current_file.as_mut() else {
            return;
        };
        let bytes = line.as_bytes();
        match file.write_all(bytes).and_then(|()| file.flush()) {
            Ok(()) => self.current_file_size += bytes.len() as u64,
            Err(err) => warn!("failed to write log line: {err}"),
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        // 1. Close the live stream.
        self.current_file = None;

        // 2. Delete the oldest archive if present.
        if self.max_file_count > 0 {
            let oldest = self.archive_path(self.max_file_count - 1);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
        }

        // 3. Shift every remaining archive up by one generation.
        if self.max_file_count >= 2 {
            for i in (0..self.max_file_count - 1).rev() {
                let from = self.archive_path(i);
                if from.exists() {
                    fs::rename(&from, self.archive_path(i + 1))?;
                }
            }
        }

        // 4. Move the live file to generation 0.
        let generation_zero = self.archive_path(0).with_extension(""); // base.0 (no .gz yet)
        fs::rename(&self.base_path, &generation_zero)?;

        // 5. Compress generation 0 in place, then unlink the plain copy.
        gzip_file(&generation_zero, &self.archive_path(0))?;
        fs::remove_file(&generation_zero)?;

        // 6. Re-open a fresh live file.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.base_path)?;
        self.current_file = Some(file);
        self.current_file_size = 0;

        // 7. Hygiene: unlink any archives beyond the retention bound.
        self.unlink_stale_archives();

        Ok(())
    }

    fn unlink_stale_archives(&self) {
        for i in self.max_file_count..self.max_file_count.saturating_add(HYGIENE_SCAN_LIMIT) {
            let path = self.archive_path(i);
            if path.exists() {
                if let Err(err) = fs::remove_file(&path) {
                    warn!("failed to unlink stale archive {path:?}: {err}");
                }
            }
        }
    }
}

fn gzip_file(src: &Path, dst: &Path) -> io::Result<()> {
    let mut input = File::open(src)?;
    let output = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dst)?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_parent_directory_and_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/events.csv");
        let mut sink = LogSink::new(&path, 1024, 3).unwrap();
        sink.write_line("hello\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn rotation_produces_bounded_archives() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.csv");
        let mut sink = LogSink::new(&path, 50, 3).unwrap();

        for i in 0..20 {
            sink.write_line(&format!("line-{i:02}-of-roughly-sixty-bytes-padding\n"));
        }

        assert!(path.exists());
        assert!(dir.path().join("events.csv.0.gz").exists());
        assert!(dir.path().join("events.csv.1.gz").exists());
        assert!(dir.path().join("events.csv.2.gz").exists());
        assert!(!dir.path().join("events.csv.3.gz").exists());
    }

    #[test]
    fn idempotent_shutdown_is_a_no_op() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.csv");
        let mut sink = LogSink::new(&path, 1024, 3).unwrap();
        sink.write_line("a\n");
        sink.disabled = true;
        sink.write_line("b\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n");
    }
}
