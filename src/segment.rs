//! Segment file: a single on-disk file holding a 4096-byte header followed
//! by a contiguous stream of length-prefixed message records (spec §4.A).
//!
//! Writes go through `std::os::unix::fs::FileExt`'s positioned
//! `read_at`/`write_at` rather than a shared cursor, so a handle never
//! needs to seek before a write. Reads of already-committed segments use a
//! read-only `memmap2` mapping (segment files past the active one are
//! immutable, so this is safe without holding the channel's lock).

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::header::{self, SegmentHeader};
use crate::record;
use crate::{Error, Result};

/// A committed segment's coordinates, as read from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub offset_begin: u64,
    pub offset_head: u64,
}

/// The in-memory representation of the currently-writable segment:
/// open file descriptor, cached `offset_head`, and a dirty flag. Owned
/// exclusively by its `Channel`.
pub struct SegmentHandle {
    file: File,
    path: PathBuf,
    pub offset_begin: u64,
    /// In-memory head, reflecting committed *and* uncommitted appends.
    pub offset_head: u64,
    /// Byte position in the file where the next record will be written.
    write_pos: u64,
    dirty: bool,
}

impl SegmentHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Current on-disk size: header plus every byte written so far
    /// (committed or not). Used by the channel to decide when to rotate.
    pub fn size_on_disk(&self) -> u64 {
        self.write_pos
    }
}

/// Builds the `<channel>~<offset_begin>` filename for a segment.
pub fn segment_filename(channel: &str, offset_begin: u64) -> String {
    format!("{channel}~{offset_begin}")
}

pub fn segment_path(dir: &Path, channel: &str, offset_begin: u64) -> PathBuf {
    dir.join(segment_filename(channel, offset_begin))
}

pub fn segment_temp_path(dir: &Path, channel: &str, offset_begin: u64) -> PathBuf {
    dir.join(format!("{}~", segment_filename(channel, offset_begin)))
}

/// Parses a directory entry name against `^([A-Za-z0-9._-]+)~([0-9]+)$`.
/// Returns `None` for anything else, including the trailing-`~` temp-file
/// form and the bare `~lock`/`~serverid` files — recovery leaves those
/// untouched (spec §4.D).
pub fn parse_segment_filename(name: &str) -> Option<(String, u64)> {
    let tilde = name.find('~')?;
    let (channel, rest) = name.split_at(tilde);
    let digits = &rest[1..];
    if channel.is_empty() || digits.is_empty() {
        return None;
    }
    let valid_channel = channel
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    let valid_digits = digits.chars().all(|c| c.is_ascii_digit());
    if !valid_channel || !valid_digits {
        return None;
    }
    let offset_begin = digits.parse::<u64>().ok()?;
    Some((channel.to_string(), offset_begin))
}

/// Creates `<channel_path>~<offset_begin>`, writes the header with
/// `offset_head = offset_begin`, and fsyncs. Fails if the file already
/// exists.
pub fn segment_create(dir: &Path, channel: &str, offset_begin: u64) -> Result<SegmentHandle> {
    let path = segment_path(dir, channel, offset_begin);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(&path)?;
    let header = SegmentHeader::new(offset_begin);
    file.write_all_at(&header.to_bytes(), 0)?;
    file.sync_all()?;
    Ok(SegmentHandle {
        file,
        path,
        offset_begin,
        offset_head: offset_begin,
        write_pos: header::HEADER_SIZE as u64,
        dirty: false,
    })
}

/// Opens an existing segment for append+read, verifying magic/version and
/// restoring the writer's cursor to the end of the *committed* region —
/// any uncommitted tail bytes left by a crash are discarded and will be
/// overwritten by the next append.
pub fn segment_open(dir: &Path, channel: &str, offset_begin: u64) -> Result<SegmentHandle> {
    let path = segment_path(dir, channel, offset_begin);
    let file = OpenOptions::new().read(true).write(true).open(&path)?;
    let mut header_buf = [0u8; header::HEADER_SIZE];
    file.read_exact_at(&mut header_buf, 0)?;
    let header = SegmentHeader::from_bytes(&header_buf)?;
    check_offset_head(offset_begin, header.offset_head)?;
    let write_pos = locate_committed_end(&file, offset_begin, header.offset_head)?;
    Ok(SegmentHandle {
        file,
        path,
        offset_begin,
        offset_head: header.offset_head,
        write_pos,
        dirty: false,
    })
}

/// Opens a segment read-only and returns just its header coordinates.
/// Used by recovery.
pub fn segment_read_header(dir: &Path, channel: &str, offset_begin: u64) -> Result<SegmentDescriptor> {
    let path = segment_path(dir, channel, offset_begin);
    let file = File::open(&path)?;
    let mut header_buf = [0u8; header::HEADER_SIZE];
    file.read_exact_at(&mut header_buf, 0)?;
    let header = SegmentHeader::from_bytes(&header_buf)?;
    check_offset_head(offset_begin, header.offset_head)?;
    Ok(SegmentDescriptor {
        offset_begin,
        offset_head: header.offset_head,
    })
}

/// Rejects the "impossible offset" case spec §7 calls out under `ECORRUPT`:
/// a transaction block claiming fewer committed messages than the segment's
/// own starting offset.
fn check_offset_head(offset_begin: u64, offset_head: u64) -> Result<()> {
    if offset_head < offset_begin {
        return Err(Error::Corrupt("segment offset_head precedes its offset_begin"));
    }
    Ok(())
}

/// Scans the record stream counting logical offsets until `offset_head` is
/// reached, returning the byte position just past the last committed
/// record. This is where the next append must write.
fn locate_committed_end(file: &File, offset_begin: u64, offset_head: u64) -> Result<u64> {
    let want = header::HEADER_SIZE as u64;
    let len = file.metadata()?.len();
    if len < want {
        return Err(Error::Corrupt("segment shorter than header"));
    }
    let mut buf = vec![0u8; (len - want) as usize];
    file.read_exact_at(&mut buf, want)?;

    let mut pos = 0usize;
    let mut logical = offset_begin;
    while logical < offset_head {
        if pos + record::PREFIX_SIZE > buf.len() {
            return Err(Error::Corrupt("segment missing committed records"));
        }
        let reclen = record::decode_prefix(&buf[pos..])? as usize;
        let end = pos + record::PREFIX_SIZE + reclen;
        if end > buf.len() {
            return Err(Error::Corrupt("segment missing committed records"));
        }
        pos = end;
        logical += 1;
    }
    Ok(want + pos as u64)
}

/// Appends one record at the end of the file. Does not update the
/// on-disk transaction block and does not fsync — durability is
/// `segment_commit`'s job.
pub fn segment_append(handle: &mut SegmentHandle, bytes: &[u8]) -> Result<u64> {
    let record = record::encode(bytes);
    handle.file.write_all_at(&record, handle.write_pos)?;
    let assigned_offset = handle.offset_head;
    handle.write_pos += record.len() as u64;
    handle.offset_head += 1;
    handle.dirty = true;
    Ok(assigned_offset)
}

/// The commit protocol (spec §4.A/§4.B): fsync the record region, then
/// overwrite the transaction block with the current `offset_head`, fsync
/// again. Idempotent — a no-op when the handle isn't dirty.
pub fn segment_commit(handle: &mut SegmentHandle) -> Result<()> {
    if !handle.dirty {
        return Ok(());
    }
    handle.file.sync_all()?;
    let header = SegmentHeader::new(handle.offset_head);
    handle
        .file
        .write_all_at(&header.transaction_block_bytes(), header::TRANSACTION_BLOCK_OFFSET as u64)?;
    handle.file.sync_all()?;
    handle.dirty = false;
    Ok(())
}

/// Reads committed records from one segment, starting at the first
/// logical offset `>= start_offset`, stopping after `batch_size` messages
/// or at the end of the committed region. A malformed or truncated length
/// prefix ends the scan cleanly rather than erroring, matching the
/// not-yet-committed-tail case spec §4.A describes.
pub fn segment_read(
    dir: &Path,
    channel: &str,
    offset_begin: u64,
    start_offset: u64,
    batch_size: u32,
) -> Result<Vec<(u64, Vec<u8>)>> {
    let path = segment_path(dir, channel, offset_begin);
    let file = File::open(&path)?;
    let mmap = unsafe { memmap2::Mmap::map(&file)? };
    if mmap.len() < header::HEADER_SIZE {
        return Err(Error::Corrupt("segment shorter than header"));
    }
    let header = SegmentHeader::from_bytes(&mmap[..header::HEADER_SIZE])?;
    check_offset_head(offset_begin, header.offset_head)?;
    let committed_head = header.offset_head;

    let mut out = Vec::new();
    let mut logical_offset = offset_begin;
    let mut pos = header::HEADER_SIZE;
    while logical_offset < committed_head && (out.len() as u32) < batch_size {
        if pos + record::PREFIX_SIZE > mmap.len() {
            break;
        }
        let len = match record::decode_prefix(&mmap[pos..]) {
            Ok(len) => len as usize,
            Err(_) => break,
        };
        let record_end = pos + record::PREFIX_SIZE + len;
        if record_end > mmap.len() {
            break;
        }
        if logical_offset >= start_offset {
            out.push((
                logical_offset,
                mmap[pos + record::PREFIX_SIZE..record_end].to_vec(),
            ));
        }
        pos = record_end;
        logical_offset += 1;
    }
    Ok(out)
}
