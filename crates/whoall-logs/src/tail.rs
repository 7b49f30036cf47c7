use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::TailError;

/// Bytes appended to a file since some offset
struct Chunk {
    bytes: Vec<u8>,
    /// Offset the file is positioned at after the read
    end: u64,
    /// File was shorter than the requested offset and was read from the start
    truncated: bool,
}

fn read_chunk(path: &Path, cursor: u64) -> Result<Chunk, TailError> {
    let mut file = File::open(path).map_err(|source| TailError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let file_length = file
        .metadata()
        .map_err(|source| TailError::Metadata {
            path: path.to_path_buf(),
            source,
        })?
        .len();

    // Rotated or truncated underneath us: everything in the file is new
    let truncated = file_length < cursor;
    let start = if truncated { 0 } else { cursor };

    let read_error = |source| TailError::Read {
        path: path.to_path_buf(),
        offset: start,
        source,
    };

    file.seek(SeekFrom::Start(start)).map_err(read_error)?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(read_error)?;

    Ok(Chunk {
        end: start + bytes.len() as u64,
        bytes,
        truncated,
    })
}

/// Read everything appended to `path` since byte offset `cursor`.
///
/// Returns the text read and the offset to pass on the next call. If the file
/// is now shorter than `cursor` it is read from the beginning. Never waits for
/// more data.
pub fn read_new_since(path: &Path, cursor: u64) -> Result<(String, u64), TailError> {
    let chunk = read_chunk(path, cursor)?;
    let text = String::from_utf8_lossy(&chunk.bytes).into_owned();
    Ok((text, chunk.end))
}

/// Read cursor over a single append-only log file.
///
/// Only complete lines are handed out. A trailing partial line is held back
/// until its newline arrives.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    cursor: u64,
    pending: Vec<u8>,
}

impl LogTail {
    /// Start reading at byte offset `cursor`
    pub fn new(path: impl Into<PathBuf>, cursor: u64) -> Self {
        Self {
            path: path.into(),
            cursor,
            pending: Vec::new(),
        }
    }

    /// Start at the current end of the file so existing content is not replayed
    pub fn at_end(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cursor = match std::fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(error) => {
                tracing::warn!(
                    log_path = %path.display(),
                    %error,
                    "Log file not readable yet, starting from the beginning once it appears"
                );
                0
            }
        };
        Self::new(path, cursor)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the first byte not yet read from the file
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Bytes of an incomplete trailing line waiting for its newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Read the complete lines appended since the last call.
    ///
    /// On error nothing changes, so the same bytes are read again next time.
    pub fn read_lines(&mut self) -> Result<Vec<String>, TailError> {
        let chunk = read_chunk(&self.path, self.cursor)?;

        if chunk.truncated {
            tracing::warn!(
                log_path = %self.path.display(),
                previous_offset = self.cursor,
                "Log file truncated, reading from the start"
            );
            self.pending.clear();
        }

        self.cursor = chunk.end;
        self.pending.extend_from_slice(&chunk.bytes);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Ok(Vec::new());
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        let lines = complete
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();

        Ok(lines)
    }
}
