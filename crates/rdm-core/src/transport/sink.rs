//! Response sinks: where a transfer's status, headers and body go.

use std::fs;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;

/// Receives one response as it streams in. A new status line (redirect hop)
/// starts the response over.
pub trait ResponseSink {
    fn on_status(&mut self, _status: u32) {}

    fn on_header(&mut self, _name: &str, _value: &str) {}

    /// Accept a body chunk; returning `false` aborts the transfer.
    fn on_body_chunk(&mut self, data: &[u8]) -> bool;
}

/// Discards the body; used for HEAD requests.
#[derive(Debug, Default)]
pub struct HeadSink;

impl ResponseSink for HeadSink {
    fn on_body_chunk(&mut self, _data: &[u8]) -> bool {
        true
    }
}

/// In-memory buffer that grows in fixed steps.
///
/// With [`BufferSink::set_refuse_full_body`] a `200` answer to a ranged
/// request is refused at its first body chunk instead of being buffered.
#[derive(Debug, Default)]
pub struct BufferSink {
    data: Vec<u8>,
    status: u32,
    refuse_full_body: bool,
    refused: Option<u32>,
}

impl BufferSink {
    /// Capacity is reserved in multiples of this.
    pub const GROWTH_STEP: usize = 4 * 1024 * 1024;

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.status = 0;
        self.refused = None;
    }

    pub fn set_refuse_full_body(&mut self, refuse: bool) {
        self.refuse_full_body = refuse;
    }

    /// Status whose body was refused, if the transfer was cut short.
    pub fn refused(&self) -> Option<u32> {
        self.refused
    }

    fn reserve_for(&mut self, extra: usize) {
        let needed = self.data.len() + extra;
        if needed > self.data.capacity() {
            let target = needed.div_ceil(Self::GROWTH_STEP) * Self::GROWTH_STEP;
            self.data.reserve_exact(target - self.data.len());
        }
    }
}

impl ResponseSink for BufferSink {
    fn on_status(&mut self, status: u32) {
        self.data.clear();
        self.status = status;
        self.refused = None;
    }

    fn on_body_chunk(&mut self, data: &[u8]) -> bool {
        if self.refuse_full_body && self.status == 200 {
            self.refused = Some(self.status);
            return false;
        }
        self.reserve_for(data.len());
        self.data.extend_from_slice(data);
        true
    }
}

/// Streams the body into a temporary file beside the target. The target is
/// only replaced by [`FileSink::commit`]; a sink dropped without commit
/// leaves the target untouched and removes its temporary file.
#[derive(Debug)]
pub struct FileSink {
    target: PathBuf,
    part: Option<NamedTempFile>,
    written: u64,
    error: Option<io::Error>,
}

impl FileSink {
    /// Prepare to replace `target`, creating missing parent directories.
    pub fn create(target: &Path) -> io::Result<Self> {
        let dir = match target.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let part = tempfile::Builder::new()
            .prefix(".rdm-")
            .suffix(".part")
            .tempfile_in(&dir)?;
        Ok(FileSink {
            target: target.to_path_buf(),
            part: Some(part),
            written: 0,
            error: None,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Write error that aborted the transfer, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Cut the received body to length, stamp its mtime and move it over the
    /// target. An existing target's permissions are carried over.
    pub fn commit(&mut self, modified: SystemTime) -> io::Result<()> {
        let Some(mut part) = self.part.take() else {
            return Err(io::Error::new(io::ErrorKind::Other, "response already committed"));
        };
        part.flush()?;
        let file = part.as_file();
        file.set_len(self.written)?;
        if let Ok(meta) = fs::metadata(&self.target) {
            file.set_permissions(meta.permissions())?;
        }
        file.set_modified(modified)?;
        file.sync_all()?;
        part.persist(&self.target).map_err(|e| e.error)?;
        Ok(())
    }

    fn restart(&mut self) -> io::Result<()> {
        if let Some(part) = self.part.as_mut() {
            part.as_file().set_len(0)?;
            part.seek(SeekFrom::Start(0))?;
        }
        Ok(())
    }
}

impl ResponseSink for FileSink {
    fn on_status(&mut self, _status: u32) {
        if self.written > 0 {
            if let Err(e) = self.restart() {
                self.error = Some(e);
            }
            self.written = 0;
        }
    }

    fn on_body_chunk(&mut self, data: &[u8]) -> bool {
        if self.error.is_some() {
            return false;
        }
        let Some(part) = self.part.as_mut() else {
            return false;
        };
        match part.write_all(data) {
            Ok(()) => {
                self.written += data.len() as u64;
                true
            }
            Err(e) => {
                self.error = Some(e);
                false
            }
        }
    }
}
