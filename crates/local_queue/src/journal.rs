//! Framed append-only journal
//!
//! Frame layout: `[len: u32 LE][crc32: u32 LE][payload]`, where the payload
//! is one JSON-encoded entry. Replay stops at the first short,
//! checksum-failing or undecodable frame and truncates the file there, so a
//! torn tail from an unclean shutdown repairs itself on the next open.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::error::QueueError;
use crate::lock::JournalLock;

/// Bytes of `len` + `crc32` preceding every payload
pub const FRAME_HEADER_LEN: usize = 8;

/// Largest payload accepted on write or replay
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Entries recovered when a journal is opened
#[derive(Debug)]
pub struct Replay<T> {
    /// Valid entries, in write order
    pub entries: Vec<T>,
    /// Bytes cut from the tail because they did not form a valid frame
    pub truncated_bytes: u64,
}

/// Append-only journal of `T` entries
///
/// One owner at a time: opening takes an exclusive lock released on drop.
pub struct Journal<T> {
    path: PathBuf,
    file: File,
    _lock: JournalLock,
    /// Length of the valid prefix (end of the last complete frame)
    len: u64,
    frames: usize,
    /// Set when the file may no longer match `len`; appends are refused
    poisoned: bool,
    _entry: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> Journal<T> {
    /// Open or create the journal at `path` and replay its entries
    ///
    /// Missing parent directories are created. Fails with
    /// [`QueueError::Locked`] while another handle has the journal open.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Replay<T>), QueueError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let lock = JournalLock::acquire(&path)?;

        let created = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        if created {
            sync_parent_dir(&path)?;
        }

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (entries, valid_len) = decode_frames::<T>(&bytes);
        let truncated_bytes = (bytes.len() - valid_len) as u64;
        if truncated_bytes > 0 {
            warn!(
                path = %path.display(),
                valid_len,
                truncated_bytes,
                "Journal tail is torn or corrupt, truncating"
            );
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }

        debug!(path = %path.display(), frames = entries.len(), "Journal replayed");

        let journal = Self {
            path,
            file,
            _lock: lock,
            len: valid_len as u64,
            frames: entries.len(),
            poisoned: false,
            _entry: PhantomData,
        };
        Ok((
            journal,
            Replay {
                entries,
                truncated_bytes,
            },
        ))
    }

    /// Append one entry and fsync before returning
    ///
    /// On failure the file is cut back to its previous length, so a failed
    /// append never leaves a partial frame ahead of later ones. If that cut
    /// fails too, the journal is poisoned and refuses appends until reopened
    /// (replay then truncates the partial frame).
    pub fn append(&mut self, entry: &T) -> Result<(), QueueError> {
        self.ensure_writable()?;
        let frame = encode_frame(entry)?;

        if let Err(e) = write_synced(&mut self.file, &frame) {
            if let Err(trunc) = self.file.set_len(self.len) {
                error!(
                    path = %self.path.display(),
                    error = %trunc,
                    "Failed to roll back partial journal frame, refusing further appends"
                );
                self.poisoned = true;
            }
            return Err(e.into());
        }

        self.len += frame.len() as u64;
        self.frames += 1;
        Ok(())
    }

    /// Atomically replace the journal content with `entries`
    ///
    /// Written to a sibling temp file, fsynced, renamed over the journal,
    /// then the directory is fsynced. A crash at any point leaves either the
    /// old or the new journal intact.
    pub fn rewrite<'a, I>(&mut self, entries: I) -> Result<(), QueueError>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        self.ensure_writable()?;
        let tmp = temp_path(&self.path);

        let (written, frames) = match write_temp(&tmp, entries) {
            Ok(summary) => summary,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };

        fs::rename(&tmp, &self.path)?;

        // From here the old handle points at an unlinked inode
        let reopened = sync_parent_dir(&self.path).and_then(|()| {
            OpenOptions::new()
                .read(true)
                .append(true)
                .open(&self.path)
        });
        match reopened {
            Ok(file) => {
                self.file = file;
                self.len = written;
                self.frames = frames;
                Ok(())
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Journal replaced but not reopened, refusing further appends"
                );
                self.poisoned = true;
                Err(e.into())
            }
        }
    }

    /// Whether appends are refused until the journal is reopened
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn ensure_writable(&self) -> Result<(), QueueError> {
        if self.poisoned {
            return Err(QueueError::JournalPoisoned {
                path: self.path.display().to_string(),
            });
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of valid frames on disk
    pub fn len_bytes(&self) -> u64 {
        self.len
    }

    /// Number of frames on disk
    pub fn frames(&self) -> usize {
        self.frames
    }
}

/// Encode one entry as a complete frame
pub fn encode_frame<T: Serialize>(entry: &T) -> Result<Vec<u8>, QueueError> {
    let payload = serde_json::to_vec(entry)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(QueueError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&checksum(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode the valid prefix of `bytes`
///
/// Returns the entries and the byte length they occupy.
fn decode_frames<T: DeserializeOwned>(bytes: &[u8]) -> (Vec<T>, usize) {
    let mut entries = Vec::new();
    let mut offset = 0;
    while let Some((entry, frame_len)) = decode_frame(&bytes[offset..]) {
        entries.push(entry);
        offset += frame_len;
    }
    (entries, offset)
}

fn decode_frame<T: DeserializeOwned>(buf: &[u8]) -> Option<(T, usize)> {
    let header = buf.get(..FRAME_HEADER_LEN)?;
    let len = u32::from_le_bytes(header[0..4].try_into().ok()?) as usize;
    let crc = u32::from_le_bytes(header[4..8].try_into().ok()?);
    if len > MAX_FRAME_LEN {
        return None;
    }

    let payload = buf.get(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len)?;
    if checksum(payload) != crc {
        return None;
    }

    let entry = serde_json::from_slice(payload).ok()?;
    Some((entry, FRAME_HEADER_LEN + len))
}

fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

fn write_synced(file: &mut File, frame: &[u8]) -> io::Result<()> {
    file.write_all(frame)?;
    file.sync_data()
}

fn write_temp<'a, T, I>(tmp: &Path, entries: I) -> Result<(u64, usize), QueueError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut out = BufWriter::new(File::create(tmp)?);
    let mut written = 0u64;
    let mut frames = 0usize;
    for entry in entries {
        let frame = encode_frame(entry)?;
        out.write_all(&frame)?;
        written += frame.len() as u64;
        frames += 1;
    }
    let file = out.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok((written, frames))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".compact");
    path.with_file_name(name)
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => File::open(parent)?.sync_all(),
        None => File::open(".")?.sync_all(),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
