//! Output devices the writer can flush into.
//!
//! A device is either closed or open in an [`OpenMode`]. The writer only writes to devices whose
//! mode allows writing, and opens closed devices itself.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Mode a device is open in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Reading only.
    ReadOnly,
    /// Writing only; opening truncates existing content.
    WriteOnly,
    /// Reading and writing; existing content is kept.
    ReadWrite,
}

impl OpenMode {
    /// Return `true` when the mode permits writing.
    pub fn is_writable(self) -> bool {
        matches!(self, OpenMode::WriteOnly | OpenMode::ReadWrite)
    }
}

/// Byte sink with an explicit open state.
pub trait OutputDevice: Write {
    /// Current mode, `None` when closed.
    fn open_mode(&self) -> Option<OpenMode>;

    /// Open a closed device in `mode`.
    fn open(&mut self, mode: OpenMode) -> io::Result<()>;

    /// Return `true` when the device is open.
    fn is_open(&self) -> bool {
        self.open_mode().is_some()
    }

    /// Return `true` when the device is open in a writable mode.
    fn is_writable(&self) -> bool {
        self.open_mode().is_some_and(OpenMode::is_writable)
    }
}

fn already_open() -> io::Error {
    io::Error::other("device is already open")
}

fn not_writable() -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        "device is not open for writing",
    )
}

/// File-backed device, opened lazily.
#[derive(Debug)]
pub struct FileDevice {
    path: PathBuf,
    file: Option<File>,
    mode: Option<OpenMode>,
}

impl FileDevice {
    /// Create a closed device for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            mode: None,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the file, flushing nothing beyond what `Write` already wrote.
    pub fn close(&mut self) {
        self.file = None;
        self.mode = None;
    }
}

impl OutputDevice for FileDevice {
    fn open_mode(&self) -> Option<OpenMode> {
        self.mode
    }

    fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        if self.mode.is_some() {
            return Err(already_open());
        }
        let file = match mode {
            OpenMode::ReadOnly => File::open(&self.path)?,
            OpenMode::WriteOnly => File::create(&self.path)?,
            OpenMode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?,
        };
        self.file = Some(file);
        self.mode = Some(mode);
        Ok(())
    }
}

impl Write for FileDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.is_writable() {
            return Err(not_writable());
        }
        match self.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(not_writable()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// In-memory device.
#[derive(Debug, Default, Clone)]
pub struct BufferDevice {
    data: Vec<u8>,
    mode: Option<OpenMode>,
}

impl BufferDevice {
    /// Create a closed, empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a closed buffer holding `data`.
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data, mode: None }
    }

    /// Borrow the buffered bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take the buffered bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Close the buffer, keeping its content.
    pub fn close(&mut self) {
        self.mode = None;
    }
}

impl OutputDevice for BufferDevice {
    fn open_mode(&self) -> Option<OpenMode> {
        self.mode
    }

    fn open(&mut self, mode: OpenMode) -> io::Result<()> {
        if self.mode.is_some() {
            return Err(already_open());
        }
        if mode == OpenMode::WriteOnly {
            self.data.clear();
        }
        self.mode = Some(mode);
        Ok(())
    }
}

impl Write for BufferDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.is_writable() {
            return Err(not_writable());
        }
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Probe whether a wallpaper could be written at `path` without creating anything.
///
/// An existing file must open for writing (without truncation). For a missing file an anonymous
/// temporary file is created in the parent directory, so ownership and ACLs are honored; it is
/// unlinked before this returns.
pub fn path_is_writable(path: &Path) -> bool {
    if path.is_dir() {
        return false;
    }
    if path.exists() {
        return OpenOptions::new().write(true).open(path).is_ok();
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    parent.is_dir() && tempfile::tempfile_in(parent).is_ok()
}

#[cfg(test)]
#[path = "../tests/unit/device.rs"]
mod tests;
