use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Errors from reading or writing a journal file.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("journal serialization error: {0}")]
    Serialization(String),

    #[error("journal writer lock poisoned")]
    LockPoisoned,
}

/// Flush/sync strategy for journal appends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every append.
    EveryWrite,
    /// Flush to the OS and let the page cache decide.
    #[default]
    OsDefault,
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

struct JournalWriter {
    writer: BufWriter<File>,
    offset: u64,
}

/// Append-only, crash-recoverable journal of bincode frames.
///
/// On-disk format, repeated:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode)]
/// ```
///
/// A damaged frame is skipped and reading resumes at the next intact frame,
/// even when the damage hit a length header. Only bytes after the last
/// intact frame are treated as a torn tail: [`open`](Self::open) moves them
/// to a `<file>.corrupt-<offset>` sidecar and cuts them off, so new frames
/// always land on a clean boundary.
pub struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    sync_mode: SyncMode,
}

impl Journal {
    /// Open (or create) the journal file at `path`.
    pub fn open(path: &Path, sync_mode: SyncMode) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let data = fs::read(path)?;
        let (_, valid_end) = scan_frames(&data);
        if valid_end < data.len() as u64 {
            let sidecar = sidecar_path(path, valid_end);
            fs::write(&sidecar, &data[valid_end as usize..])?;
            warn!(
                path = %path.display(),
                valid_end,
                file_len = data.len(),
                sidecar = %sidecar.display(),
                "torn journal tail; moved to sidecar and truncated"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), offset = valid_end, "journal opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset: valid_end,
            }),
            sync_mode,
        })
    }

    /// Append one entry. Returns the byte offset at which its frame starts.
    pub fn append<T: Serialize>(&self, entry: &T) -> Result<u64, JournalError> {
        let payload =
            bincode::serialize(entry).map_err(|e| JournalError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len()).map_err(|_| {
            JournalError::Serialization(format!("entry too large: {} bytes", payload.len()))
        })?;
        let crc = crc32fast::hash(&payload);

        let mut w = self.lock()?;
        let entry_offset = w.offset;

        w.writer.write_all(&length.to_le_bytes())?;
        w.writer.write_all(&crc.to_le_bytes())?;
        w.writer.write_all(&payload)?;
        w.writer.flush()?;
        if self.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_all()?;
        }

        w.offset += HEADER_SIZE + payload.len() as u64;

        debug!(offset = entry_offset, len = payload.len(), "journal append");
        Ok(entry_offset)
    }

    /// Read every intact entry, front to back.
    pub fn replay<T: DeserializeOwned>(&self) -> Result<Vec<T>, JournalError> {
        // Hold the writer so no append interleaves with the read.
        let _w = self.lock()?;
        let data = fs::read(&self.path)?;
        let (frames, _) = scan_frames(&data);

        let mut entries = Vec::with_capacity(frames.len());
        for (offset, payload) in frames {
            match bincode::deserialize::<T>(payload) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(offset, error = %e, "failed to deserialize journal entry; skipping");
                }
            }
        }

        debug!(recovered = entries.len(), "journal replay complete");
        Ok(entries)
    }

    /// Current end-of-journal offset.
    pub fn offset(&self) -> Result<u64, JournalError> {
        Ok(self.lock()?.offset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    fn lock(&self) -> Result<MutexGuard<'_, JournalWriter>, JournalError> {
        self.writer.lock().map_err(|_| JournalError::LockPoisoned)
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("path", &self.path)
            .field("sync_mode", &self.sync_mode)
            .finish()
    }
}

/// What sits at one offset of a journal buffer.
enum Frame<'a> {
    /// Header and CRC check out.
    Intact { payload: &'a [u8], next: u64 },
    /// Length fits the buffer but the CRC does not match.
    Damaged { next: u64 },
    /// No frame fits here: short header, zero length, or length past the end.
    Invalid,
}

fn frame_at(data: &[u8], offset: u64) -> Frame<'_> {
    let len = data.len() as u64;
    if offset + HEADER_SIZE > len {
        return Frame::Invalid;
    }
    let at = offset as usize;
    let length = u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
    let expected_crc = u32::from_le_bytes([data[at + 4], data[at + 5], data[at + 6], data[at + 7]]);
    let next = offset + HEADER_SIZE + u64::from(length);
    if length == 0 || next > len {
        return Frame::Invalid;
    }

    let payload = &data[(offset + HEADER_SIZE) as usize..next as usize];
    if crc32fast::hash(payload) == expected_crc {
        Frame::Intact { payload, next }
    } else {
        Frame::Damaged { next }
    }
}

/// First offset after `from` holding an intact frame.
fn resync(data: &[u8], from: u64) -> Option<u64> {
    (from..data.len() as u64).find(|&at| matches!(frame_at(data, at), Frame::Intact { .. }))
}

/// Split `data` into intact payloads with their offsets, plus the end offset
/// of the last intact frame.
///
/// A damaged frame whose length still lands on an intact frame (or the end)
/// is skipped by length. Anything else means the header itself is suspect,
/// so scanning resumes at the next offset that holds an intact frame.
fn scan_frames(data: &[u8]) -> (Vec<(u64, &[u8])>, u64) {
    let len = data.len() as u64;
    let mut frames = Vec::new();
    let mut offset: u64 = 0;
    let mut valid_end: u64 = 0;

    while offset < len {
        match frame_at(data, offset) {
            Frame::Intact { payload, next } => {
                frames.push((offset, payload));
                offset = next;
                valid_end = next;
                continue;
            }
            Frame::Damaged { next }
                if next == len || matches!(frame_at(data, next), Frame::Intact { .. }) =>
            {
                warn!(offset, "CRC mismatch; skipping journal frame");
                offset = next;
                valid_end = next;
                continue;
            }
            Frame::Damaged { .. } | Frame::Invalid => {}
        }

        match resync(data, offset + 1) {
            Some(at) => {
                warn!(offset, resumed_at = at, "damaged journal header; skipping to next intact frame");
                offset = at;
            }
            None => break,
        }
    }

    (frames, valid_end)
}

fn sidecar_path(path: &Path, offset: u64) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".corrupt-{offset}"));
    PathBuf::from(name)
}
