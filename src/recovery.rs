//! Recovery (spec §4.D): on startup, enumerate segment files in the data
//! directory, parse their headers, group by channel, and reconstruct
//! channel objects in a consistent state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::channel::Channel;
use crate::segment::{self, SegmentDescriptor};
use crate::Result;

/// Scans `dir` for `<channel>~<offset>` entries and rebuilds one `Channel`
/// per distinct channel name found. Files that don't match the pattern
/// (`~lock`, `~serverid`, temp files ending in `~`) are left untouched.
pub fn recover(dir: &Path, max_segment_size: u64) -> Result<Vec<Channel>> {
    let mut groups: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if let Some((channel, offset_begin)) = segment::parse_segment_filename(name) {
            groups.entry(channel).or_default().insert(offset_begin);
        }
    }

    let mut channels = Vec::with_capacity(groups.len());
    for (channel_id, offsets) in groups {
        channels.push(recover_channel(dir, &channel_id, offsets, max_segment_size)?);
    }
    Ok(channels)
}

fn recover_channel(
    dir: &Path,
    channel_id: &str,
    offsets: BTreeSet<u64>,
    max_segment_size: u64,
) -> Result<Channel> {
    let offsets: Vec<u64> = offsets.into_iter().collect();
    let mut descriptors: Vec<SegmentDescriptor> = Vec::with_capacity(offsets.len());
    for offset_begin in offsets {
        descriptors.push(segment::segment_read_header(dir, channel_id, offset_begin)?);
    }

    // Invariant 1: consecutive segments should abut. A violation means a
    // crash during rotation; the highest-offset segment is authoritative
    // regardless (spec §4.D step 2), so this is logged, not fatal.
    for pair in descriptors.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.offset_head != b.offset_begin {
            log::warn!(
                "channel {channel_id}: segment [{}, {}) does not abut the next segment's start ({}); \
                 treating crash-during-rotation and trusting the higher-offset segment",
                a.offset_begin,
                a.offset_head,
                b.offset_begin
            );
        }
    }

    let split_at = descriptors.len() - 1;
    let (archive_descriptors, active_slice) = descriptors.split_at(split_at);
    let active_descriptor = active_slice[0];
    let active = segment::segment_open(dir, channel_id, active_descriptor.offset_begin)?;

    Ok(Channel::from_recovered(
        dir.to_path_buf(),
        channel_id.to_string(),
        archive_descriptors.to_vec(),
        active,
        max_segment_size,
    ))
}
