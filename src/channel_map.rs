//! Channel Map (spec §4.C): the process-wide registry mapping channel
//! name to channel. Owns the data-directory lock and server identity.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rand::RngCore;

use crate::channel::{
    validate_channel_id, validate_max_segment_size, Channel, DEFAULT_MAX_SEGMENT_SIZE,
};
use crate::lock::DirLock;
use crate::recovery;
use crate::{Error, Result};

const SERVER_ID_FILE_NAME: &str = "~serverid";

pub struct ChannelMap {
    dir: PathBuf,
    max_segment_size: u64,
    _lock: DirLock,
    server_id: String,
    table: Mutex<HashMap<String, Arc<Channel>>>,
}

impl ChannelMap {
    /// Opens (and recovers) a data directory. Fails `EARG` if the path
    /// isn't an existing directory, `EEXCL` if another process already
    /// holds the directory lock.
    pub fn open_directory(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_directory_with_segment_size(data_dir, DEFAULT_MAX_SEGMENT_SIZE)
    }

    /// As `open_directory`, but with a caller-supplied `max_segment_size`
    /// — used by tests that need rotation to trigger well below the
    /// spec's 1 GiB default.
    pub fn open_directory_with_segment_size(
        data_dir: impl AsRef<Path>,
        max_segment_size: u64,
    ) -> Result<Self> {
        let dir = data_dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::arg(format!(
                "data directory does not exist: {}",
                dir.display()
            )));
        }
        validate_max_segment_size(max_segment_size)?;

        let lock = DirLock::acquire(dir)?;
        let server_id = read_or_create_server_id(dir)?;

        let mut table = HashMap::new();
        for channel in recovery::recover(dir, max_segment_size)? {
            table.insert(channel.id().to_string(), Arc::new(channel));
        }
        log::info!(
            "opened data directory {} with {} recovered channel(s), server id {server_id}",
            dir.display(),
            table.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            max_segment_size,
            _lock: lock,
            server_id,
            table: Mutex::new(table),
        })
    }

    /// Looks up a channel by id; if absent and `create` is true, creates
    /// it. Concurrent callers creating the same new id observe exactly
    /// one channel.
    pub fn find_channel(&self, id: &str, create: bool) -> Result<Arc<Channel>> {
        validate_channel_id(id)?;
        let mut table = self
            .table
            .lock()
            .map_err(|_| Error::Corrupt("channel map lock poisoned"))?;
        if let Some(channel) = table.get(id) {
            return Ok(Arc::clone(channel));
        }
        if !create {
            return Err(Error::arg(format!("no such channel: {id}")));
        }
        let channel = Arc::new(Channel::create(&self.dir, id, self.max_segment_size)?);
        table.insert(id.to_string(), Arc::clone(&channel));
        log::info!("created channel {id}");
        Ok(channel)
    }

    pub fn get_uid(&self) -> &str {
        &self.server_id
    }

    pub fn channel_count(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }
}

/// Reads `<data_dir>/~serverid`, or generates and atomically persists a
/// fresh 128-bit hex identifier (write to `~serverid~`, fsync, rename).
fn read_or_create_server_id(dir: &Path) -> Result<String> {
    let path = dir.join(SERVER_ID_FILE_NAME);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(contents.trim().to_string()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let id = generate_server_id();
            let temp_path = dir.join(format!("{SERVER_ID_FILE_NAME}~"));
            fs::write(&temp_path, &id)?;
            let temp_file = fs::File::open(&temp_path)?;
            temp_file.sync_all()?;
            fs::rename(&temp_path, &path)?;
            Ok(id)
        }
        Err(err) => Err(err.into()),
    }
}

fn generate_server_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
