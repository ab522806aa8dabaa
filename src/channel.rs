//! Channel: a named log made of an ordered archive of closed segments
//! plus one active, writable segment (spec §4.B).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::header::HEADER_SIZE;
use crate::record::PREFIX_SIZE;
use crate::segment::{self, SegmentDescriptor, SegmentHandle};
use crate::{Error, Result};

/// `max_segment_size = 2^30 B (≈1 GiB)`, per spec §3.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 1 << 30;

/// A segment must have room for the 4096-byte header plus at least one
/// record's length prefix and one byte of payload, or `max_message_size`
/// (`max_segment_size - HEADER_SIZE - PREFIX_SIZE`) underflows.
pub const MIN_SEGMENT_SIZE: u64 = HEADER_SIZE as u64 + PREFIX_SIZE as u64 + 1;

pub fn validate_max_segment_size(max_segment_size: u64) -> Result<()> {
    if max_segment_size < MIN_SEGMENT_SIZE {
        Err(Error::arg(format!(
            "max_segment_size {max_segment_size} must be greater than header + record-prefix \
             overhead ({} bytes)",
            HEADER_SIZE + PREFIX_SIZE
        )))
    } else {
        Ok(())
    }
}

pub fn validate_channel_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::arg(format!("invalid channel id: {id:?}")))
    }
}

struct ChannelState {
    archive: Vec<SegmentDescriptor>,
    active: SegmentHandle,
    needs_commit: bool,
    /// Mirrors the active segment's on-disk transaction block: the last
    /// offset that `commit` made durable. `fetch` never serves past this,
    /// even though `active`'s in-memory `offset_head` may be ahead of it.
    committed_offset_head: u64,
}

pub struct Channel {
    dir: PathBuf,
    id: String,
    max_segment_size: u64,
    state: Mutex<ChannelState>,
}

impl Channel {
    /// Creates a brand-new channel: one empty segment with
    /// `offset_begin = 0` (spec §3 Lifecycle).
    pub fn create(dir: &Path, id: &str, max_segment_size: u64) -> Result<Self> {
        validate_channel_id(id)?;
        validate_max_segment_size(max_segment_size)?;
        let active = segment::segment_create(dir, id, 0)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            id: id.to_string(),
            max_segment_size,
            state: Mutex::new(ChannelState {
                archive: Vec::new(),
                active,
                needs_commit: false,
                committed_offset_head: 0,
            }),
        })
    }

    /// Reassembles a channel from recovery's (archive, active) split.
    pub(crate) fn from_recovered(
        dir: PathBuf,
        id: String,
        archive: Vec<SegmentDescriptor>,
        active: SegmentHandle,
        max_segment_size: u64,
    ) -> Self {
        let committed_offset_head = active.offset_head;
        Self {
            dir,
            id,
            max_segment_size,
            state: Mutex::new(ChannelState {
                archive,
                active,
                needs_commit: false,
                committed_offset_head,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn max_message_size(&self) -> usize {
        self.max_segment_size as usize - HEADER_SIZE - PREFIX_SIZE
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, ChannelState>> {
        self.state
            .lock()
            .map_err(|_| Error::Corrupt("channel lock poisoned"))
    }

    /// Assigns `offset = active.offset_head`, appends the message, and
    /// rotates the active segment if it has filled up. Fails `EARG` on an
    /// empty or oversized message.
    pub fn append(&self, message: &[u8]) -> Result<u64> {
        if message.is_empty() {
            return Err(Error::arg("message must not be empty"));
        }
        let max_message_size = self.max_message_size();
        if message.len() > max_message_size {
            return Err(Error::arg(format!(
                "message of {} bytes exceeds max_message_size {}",
                message.len(),
                max_message_size
            )));
        }

        let mut state = self.lock_state()?;
        let offset = segment::segment_append(&mut state.active, message)?;
        state.needs_commit = true;
        if state.active.size_on_disk() >= self.max_segment_size {
            // The message is already written (and, if `rotate_locked` got
            // as far as committing the old segment, already durable); a
            // rotation failure must not turn into a lost-offset error for
            // an append that otherwise succeeded, or a retrying caller
            // would duplicate the message under a new offset. Per spec §5,
            // a rotation that fails partway just leaves the current active
            // segment over its cap; the next `append`/`commit` retries it.
            if let Err(err) = self.rotate_locked(&mut state) {
                log::warn!(
                    "channel {}: rotation after offset {offset} failed, will retry on next append/commit: {err}",
                    self.id
                );
            }
        }
        Ok(offset)
    }

    /// Failure-atomic rotation (spec §5): commit the active segment, move
    /// it to the archive, open a fresh active segment starting where the
    /// old one left off.
    fn rotate_locked(&self, state: &mut ChannelState) -> Result<()> {
        segment::segment_commit(&mut state.active)?;
        state.committed_offset_head = state.active.offset_head;
        state.needs_commit = false;

        let closed = SegmentDescriptor {
            offset_begin: state.active.offset_begin,
            offset_head: state.active.offset_head,
        };
        let new_active = segment::segment_create(&self.dir, &self.id, closed.offset_head)?;
        state.active = new_active;
        state.archive.push(closed);
        Ok(())
    }

    /// Reads committed messages starting at the first offset
    /// `>= start_offset`, up to `batch_size` messages, spanning segment
    /// boundaries as needed (spec §4.B).
    pub fn fetch(&self, start_offset: u64, batch_size: u32) -> Result<Vec<(u64, Vec<u8>)>> {
        if batch_size == 0 {
            return Ok(Vec::new());
        }
        let state = self.lock_state()?;
        if start_offset > state.active.offset_head {
            return Ok(Vec::new());
        }

        let earliest = state
            .archive
            .first()
            .map(|d| d.offset_begin)
            .unwrap_or(state.active.offset_begin);
        let effective_start = start_offset.max(earliest);

        // ECORRUPT on a single segment (spec §7) quarantines that segment
        // and stops the scan there; it does not discard messages already
        // read from earlier, healthy segments.
        let mut results = Vec::new();
        for seg in &state.archive {
            if results.len() as u32 >= batch_size {
                break;
            }
            if effective_start >= seg.offset_head {
                continue;
            }
            let remaining = batch_size - results.len() as u32;
            match segment::segment_read(&self.dir, &self.id, seg.offset_begin, effective_start, remaining) {
                Ok(batch) => results.extend(batch),
                Err(err) => {
                    log::warn!(
                        "channel {}: segment {} quarantined, returning {} message(s) read so far: {err}",
                        self.id,
                        seg.offset_begin,
                        results.len()
                    );
                    return Ok(results);
                }
            }
        }

        if (results.len() as u32) < batch_size && effective_start < state.committed_offset_head {
            let remaining = batch_size - results.len() as u32;
            match segment::segment_read(
                &self.dir,
                &self.id,
                state.active.offset_begin,
                effective_start,
                remaining,
            ) {
                Ok(batch) => results.extend(batch),
                Err(err) => {
                    log::warn!(
                        "channel {}: active segment {} quarantined, returning {} message(s) read so far: {err}",
                        self.id,
                        state.active.offset_begin,
                        results.len()
                    );
                }
            }
        }

        Ok(results)
    }

    /// The sole durability barrier exposed to callers. Idempotent.
    pub fn commit(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        if !state.needs_commit {
            return Ok(());
        }
        segment::segment_commit(&mut state.active)?;
        state.committed_offset_head = state.active.offset_head;
        state.needs_commit = false;
        Ok(())
    }
}
