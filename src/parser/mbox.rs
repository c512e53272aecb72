//! Streaming MBOX reader.
//!
//! Walks the file line by line and yields one entry per message, carrying
//! only its position and header block. Bodies are read back on demand with
//! [`read_message_at`], so the whole archive is never held in memory.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{MailQueryError, Result};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Header blocks larger than this are truncated.
const MAX_HEADER_SIZE: usize = 1024 * 1024;

/// Position and headers of one message inside an MBOX file.
#[derive(Debug, Clone)]
pub struct MboxEntry {
    /// Byte offset of the `From ` separator line.
    pub offset: u64,
    /// Length in bytes, up to the next separator or EOF.
    pub length: u64,
    /// Raw header block, separator line included.
    pub headers: Vec<u8>,
}

/// Lazy iterator over the messages of an MBOX file.
///
/// Tolerant of mixed `\n` / `\r\n` endings, a missing blank line before a
/// separator (logged), a truncated last message and a UTF-8 BOM.
pub struct MboxReader {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    line: Vec<u8>,
    current: Option<MboxEntry>,
    in_headers: bool,
    prev_line_blank: bool,
    finished: bool,
}

impl MboxReader {
    /// Open an MBOX file for sequential reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MailQueryError::FileNotFound(path.clone())
            } else {
                MailQueryError::io(&path, e)
            }
        })?;
        Ok(Self {
            path,
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            offset: 0,
            line: Vec::with_capacity(4096),
            current: None,
            in_headers: false,
            prev_line_blank: true,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next line into `self.line`; returns `false` at EOF.
    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(|e| MailQueryError::io(&self.path, e))?;
        Ok(n > 0)
    }

    fn finish_current(&mut self, end: u64) -> Option<MboxEntry> {
        self.current.take().map(|mut entry| {
            entry.length = end - entry.offset;
            entry
        })
    }
}

impl Iterator for MboxReader {
    type Item = Result<MboxEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match self.read_line() {
                Ok(true) => {}
                Ok(false) => {
                    self.finished = true;
                    return self.finish_current(self.offset).map(Ok);
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }

            let line_start = self.offset;
            self.offset += self.line.len() as u64;
            let blank = is_blank_line(&self.line);

            if is_mbox_separator(&self.line) {
                if !self.prev_line_blank {
                    warn!(
                        offset = line_start,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                let done = self.finish_current(line_start);
                self.current = Some(MboxEntry {
                    offset: line_start,
                    length: 0,
                    headers: self.line.clone(),
                });
                self.in_headers = true;
                self.prev_line_blank = false;
                if let Some(entry) = done {
                    return Some(Ok(entry));
                }
                continue;
            }

            if self.in_headers {
                if blank {
                    self.in_headers = false;
                } else if let Some(entry) = self.current.as_mut() {
                    if entry.headers.len() + self.line.len() <= MAX_HEADER_SIZE {
                        entry.headers.extend_from_slice(&self.line);
                    }
                }
            }
            self.prev_line_blank = blank;
        }
    }
}

/// Read a single message at the given offset and length.
pub fn read_message_at(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| MailQueryError::io(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| MailQueryError::io(path, e))?;
    let mut buffer = vec![0u8; length as usize];
    file.read_exact(&mut buffer)
        .map_err(|e| MailQueryError::io(path, e))?;
    Ok(buffer)
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    line.strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(line)
        .starts_with(b"From ")
}

/// Check whether a line is blank (only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter().all(|b| b.is_ascii_whitespace())
}
