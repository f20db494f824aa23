//! Append-only JSON Lines ledger.
//!
//! Records are buffered in memory and written in batches; each flush writes
//! whole lines only, so a crash can lose at most the unflushed buffer and
//! never leaves a half-encoded record from a completed flush. Readers skip
//! lines that fail to parse (a torn final line after a hard kill).

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::LedgerError;

/// How to treat an existing file when opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Keep existing lines; new records go after them
    Append,
    /// Start from an empty file
    Truncate,
}

pub struct Ledger<T> {
    path: PathBuf,
    file: File,
    buffer: Vec<T>,
    flush_threshold: usize,
    written: usize,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LedgerError + '_ {
    move |source| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Whether a non-empty file is missing its final newline.
fn needs_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl<T: Serialize> Ledger<T> {
    /// Open (creating parent directories as needed).
    ///
    /// `flush_threshold` is the number of buffered records that triggers an
    /// automatic flush from [`push`](Self::push); zero is treated as one.
    pub fn open(path: &Path, mode: OpenMode, flush_threshold: usize) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let file = match mode {
            OpenMode::Truncate => File::create(path).map_err(io_err(path))?,
            OpenMode::Append => {
                let mut file = OpenOptions::new()
                    .read(true)
                    .append(true)
                    .create(true)
                    .open(path)
                    .map_err(io_err(path))?;
                // Terminate a torn last line so the next record starts clean
                if needs_newline(&mut file).map_err(io_err(path))? {
                    log::warn!("{}: last line was incomplete, terminating it", path.display());
                    file.write_all(b"\n").map_err(io_err(path))?;
                }
                file
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            buffer: Vec::new(),
            flush_threshold: flush_threshold.max(1),
            written: 0,
        })
    }

    /// Buffer a record. Returns the number of records flushed by this call
    /// (zero unless the buffer reached the threshold).
    pub fn push(&mut self, record: T) -> Result<usize, LedgerError> {
        self.buffer.push(record);
        if self.buffer.len() >= self.flush_threshold {
            return self.flush();
        }
        Ok(0)
    }

    /// Write every buffered record. Returns how many were written.
    pub fn flush(&mut self) -> Result<usize, LedgerError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let mut out = String::new();
        for record in &self.buffer {
            out.push_str(&serde_json::to_string(record).map_err(LedgerError::Encode)?);
            out.push('\n');
        }
        self.file
            .write_all(out.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(io_err(&self.path))?;

        let n = self.buffer.len();
        self.buffer.clear();
        self.written += n;
        log::debug!("{}: flushed {n} records ({} total)", self.path.display(), self.written);
        Ok(n)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Records written to disk through this handle
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parsed contents of a ledger file.
#[derive(Debug)]
pub struct LedgerScan<T> {
    pub entries: Vec<T>,
    /// Non-empty lines that did not parse as `T`
    pub skipped_lines: usize,
    /// Non-empty lines seen
    pub lines: usize,
}

/// Read every parseable line. Returns `None` when the file does not exist.
pub fn scan<T: DeserializeOwned>(path: &Path) -> Result<Option<LedgerScan<T>>, LedgerError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_err(path)(e)),
    };

    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut scan = LedgerScan {
        entries: Vec::new(),
        skipped_lines: 0,
        lines: 0,
    };

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).map_err(io_err(path))?;
        if n == 0 {
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        scan.lines += 1;
        match serde_json::from_slice::<T>(&line) {
            Ok(entry) => scan.entries.push(entry),
            Err(e) => {
                scan.skipped_lines += 1;
                log::debug!("{}: skipping line {}: {e}", path.display(), scan.lines);
            }
        }
    }

    if scan.skipped_lines > 0 {
        log::warn!(
            "{}: skipped {} unreadable line(s)",
            path.display(),
            scan.skipped_lines
        );
    }
    Ok(Some(scan))
}
