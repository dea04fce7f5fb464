//! File tailer for reading new lines from a growing log file.
//!
//! The read position is persisted to an offset file as `inode\noffset`, so a
//! restart resumes where the previous process stopped. Rotation is detected
//! via inode change or file truncation (copy-truncate).

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::LineSource;

/// Maximum number of lines to read in a single `read_new_lines()` call.
/// A larger backlog is left on disk for the following calls.
const MAX_LINES_PER_READ: usize = 10_000;

/// How far before the end of an existing file tailing starts on first open.
pub const INITIAL_BACKLOG_BYTES: u64 = 1024;

/// Persisted read position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub inode: u64,
    pub offset: u64,
}

impl Offset {
    fn parse(content: &str) -> Option<Self> {
        let mut lines = content.lines();
        let inode = lines.next()?.trim().parse().ok()?;
        let offset = lines.next()?.trim().parse().ok()?;
        Some(Self { inode, offset })
    }

    /// Read an offset file; `None` if absent or unreadable.
    pub fn load(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        let parsed = Self::parse(&content);
        if parsed.is_none() {
            warn!(path = %path.display(), "ignoring malformed offset file");
        }
        parsed
    }

    pub fn store(&self, path: &Path) -> io::Result<()> {
        fs::write(path, format!("{}\n{}", self.inode, self.offset))
    }
}

/// Reads new lines appended to a file since the last read position.
///
/// On creation, resumes from the offset file when it still describes the
/// same file. If the file was replaced or shrank since the offset was saved,
/// it is read from the start. Without an offset file, tailing starts
/// [`INITIAL_BACKLOG_BYTES`] before the end, so up to that many bytes of old
/// content are read once. A missing file starts from the beginning once it
/// appears.
///
/// Only complete lines are returned; a trailing partial line is left for the
/// next call.
pub struct FileTailer {
    path: PathBuf,
    offset_path: PathBuf,
    position: Option<Offset>,
}

impl FileTailer {
    pub fn new(path: PathBuf, offset_path: PathBuf) -> Self {
        let position = match fs::metadata(&path) {
            Ok(metadata) => {
                let inode = get_inode(&metadata);
                let size = metadata.len();
                let position = match Offset::load(&offset_path) {
                    Some(saved) if saved.inode == inode && saved.offset <= size => {
                        info!(
                            path = %path.display(),
                            offset = saved.offset,
                            "resuming from offset file"
                        );
                        saved
                    }
                    Some(_) => {
                        info!(
                            path = %path.display(),
                            "file rotated or truncated since last run, reading from start"
                        );
                        Offset { inode, offset: 0 }
                    }
                    None => Offset {
                        inode,
                        offset: size.saturating_sub(INITIAL_BACKLOG_BYTES),
                    },
                };
                Some(position)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "log file not available, will read from start once it appears"
                );
                None
            }
        };

        let tailer = Self {
            path,
            offset_path,
            position,
        };
        tailer.persist();
        tailer
    }

    /// Read new lines appended since the last call.
    ///
    /// If the file was rotated (inode changed or size decreased),
    /// re-opens from the beginning of the new file.
    ///
    /// Returns at most `MAX_LINES_PER_READ` lines per call.
    pub fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // File gone (rotation in progress): return empty, try next time
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let current_inode = get_inode(&metadata);
        let current_size = metadata.len();

        let mut position = match self.position {
            Some(position)
                if position.inode == current_inode && position.offset <= current_size =>
            {
                position
            }
            Some(_) => {
                debug!(
                    path = %self.path.display(),
                    "file rotated or truncated, reading from start"
                );
                Offset {
                    inode: current_inode,
                    offset: 0,
                }
            }
            None => Offset {
                inode: current_inode,
                offset: 0,
            },
        };

        if current_size <= position.offset {
            self.position = Some(position);
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(position.offset))?;
        let mut reader = BufReader::new(file.take(current_size - position.offset));

        let mut lines = Vec::new();
        let mut buf = Vec::new();
        while lines.len() < MAX_LINES_PER_READ {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf)?;
            // EOF, or a partial line left for the next call
            if read == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            position.offset += read as u64;
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
            lines.push(String::from_utf8_lossy(&buf).into_owned());
        }

        self.position = Some(position);
        self.persist();

        Ok(lines)
    }

    /// Returns the current file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current read position, if the file has been seen.
    pub fn position(&self) -> Option<Offset> {
        self.position
    }

    fn persist(&self) {
        if let Some(position) = self.position
            && let Err(e) = position.store(&self.offset_path)
        {
            warn!(path = %self.offset_path.display(), error = %e, "failed to write offset file");
        }
    }
}

impl LineSource for FileTailer {
    fn pull_new_lines(&mut self) -> Vec<String> {
        match self.read_new_lines() {
            Ok(lines) => lines,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read log file");
                Vec::new()
            }
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Extract inode from file metadata (Linux-specific).
#[cfg(unix)]
fn get_inode(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

/// Fallback for non-Unix: always returns 0, relying on size-based rotation detection.
#[cfg(not(unix))]
fn get_inode(_metadata: &std::fs::Metadata) -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_tailer_small_file_read_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, "old line 1\nold line 2\n").unwrap();

        let mut tailer = FileTailer::new(path, dir.path().join("test.offset"));

        // within the initial backlog window
        let lines = tailer.read_new_lines().unwrap();
        assert_eq!(lines, vec!["old line 1", "old line 2"]);
        assert!(tailer.read_new_lines().unwrap().is_empty());
    }

    #[test]
    fn test_tailer_large_file_starts_near_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let line = format!("{}\n", "x".repeat(99));
        std::fs::write(&path, line.repeat(50)).unwrap();

        let tailer = FileTailer::new(path, dir.path().join("test.offset"));
        assert_eq!(tailer.position().unwrap().offset, 5000 - INITIAL_BACKLOG_BYTES);
    }

    #[test]
    fn test_tailer_reads_new_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, "old\n").unwrap();
        let mut tailer = FileTailer::new(path.clone(), dir.path().join("test.offset"));
        tailer.read_new_lines().unwrap();

        append(&path, "new line 1\nnew line 2\n");

        let lines = tailer.read_new_lines().unwrap();
        assert_eq!(lines, vec!["new line 1", "new line 2"]);

        // Second call: nothing new
        let lines = tailer.read_new_lines().unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_tailer_holds_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, "").unwrap();
        let mut tailer = FileTailer::new(path.clone(), dir.path().join("test.offset"));

        append(&path, "complete\npart");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["complete"]);

        append(&path, "ial\r\n");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["partial"]);
    }

    #[test]
    fn test_tailer_detects_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");

        // Write long content to establish high offset
        std::fs::write(&path, "a".repeat(3000)).unwrap();
        let mut tailer = FileTailer::new(path.clone(), dir.path().join("test.offset"));

        // "Rotate" by truncating the file and writing new shorter content
        std::fs::write(&path, "after rotation\n").unwrap();

        let lines = tailer.read_new_lines().unwrap();
        assert_eq!(lines, vec!["after rotation"]);
    }

    #[test]
    fn test_tailer_restart_resumes_from_offset_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let offset_path = dir.path().join("test.offset");
        std::fs::write(&path, "one\ntwo\n").unwrap();

        let mut tailer = FileTailer::new(path.clone(), offset_path.clone());
        assert_eq!(tailer.read_new_lines().unwrap().len(), 2);
        drop(tailer);

        append(&path, "three\n");
        let mut restarted = FileTailer::new(path, offset_path);
        assert_eq!(restarted.read_new_lines().unwrap(), vec!["three"]);
    }

    #[test]
    fn test_tailer_offset_file_then_recreate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let offset_path = dir.path().join("test.offset");
        std::fs::write(&path, "x".repeat(4000) + "\n").unwrap();

        let mut tailer = FileTailer::new(path.clone(), offset_path.clone());
        tailer.read_new_lines().unwrap();
        let saved = Offset::load(&offset_path).unwrap();
        assert_eq!(saved.offset, 4001);

        // copy-truncate: file recreated with less content than the offset
        std::fs::remove_file(&path).unwrap();
        std::fs::write(&path, "fresh\n").unwrap();

        assert_eq!(tailer.read_new_lines().unwrap(), vec!["fresh"]);
        assert_eq!(Offset::load(&offset_path).unwrap().offset, 6);
    }

    #[test]
    fn test_tailer_restart_after_truncate_reads_from_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let offset_path = dir.path().join("test.offset");
        let line = format!("{}\n", "y".repeat(99));
        std::fs::write(&path, line.repeat(100)).unwrap();

        let mut tailer = FileTailer::new(path.clone(), offset_path.clone());
        tailer.read_new_lines().unwrap();
        assert_eq!(Offset::load(&offset_path).unwrap().offset, 10_000);
        drop(tailer);

        // copy-truncate while stopped, then more than the backlog window is written
        std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        let fresh: String = (0..50).map(|i| format!("{i:>99}\n")).collect();
        append(&path, &fresh);

        let mut restarted = FileTailer::new(path, offset_path);
        assert_eq!(restarted.position().unwrap().offset, 0);
        let lines = restarted.read_new_lines().unwrap();
        assert_eq!(lines.len(), 50);
        assert_eq!(lines[0].trim(), "0");
        assert_eq!(lines[49].trim(), "49");
    }

    #[test]
    fn test_tailer_caps_lines_per_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        std::fs::write(&path, "").unwrap();
        let offset_path = dir.path().join("test.offset");
        let mut tailer = FileTailer::new(path.clone(), offset_path.clone());

        append(&path, &"l\n".repeat(MAX_LINES_PER_READ + 5));
        append(&path, "tail");

        assert_eq!(tailer.read_new_lines().unwrap().len(), MAX_LINES_PER_READ);
        assert_eq!(
            Offset::load(&offset_path).unwrap().offset,
            2 * MAX_LINES_PER_READ as u64
        );
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["l"; 5]);
        assert!(tailer.read_new_lines().unwrap().is_empty());

        append(&path, "\n");
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["tail"]);
    }

    #[test]
    fn test_tailer_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");

        let mut tailer = FileTailer::new(path.clone(), dir.path().join("test.offset"));
        assert!(tailer.position().is_none());
        assert!(tailer.read_new_lines().unwrap().is_empty());

        // appears later: read from its start
        std::fs::write(&path, "first\n").unwrap();
        assert_eq!(tailer.read_new_lines().unwrap(), vec!["first"]);

        // Remove the file: should return empty, not error
        std::fs::remove_file(&path).unwrap();
        assert!(tailer.read_new_lines().unwrap().is_empty());
    }

    #[test]
    fn test_offset_parse() {
        assert_eq!(
            Offset::parse("42\n1024"),
            Some(Offset {
                inode: 42,
                offset: 1024
            })
        );
        assert_eq!(Offset::parse("garbage"), None);
    }
}
