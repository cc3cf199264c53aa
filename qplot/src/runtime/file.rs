//! File values: shared handles with a mode-specific close discipline

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::rc::Rc;

use crate::error::Result;

/// Shared handle to an open file
pub type FileRef = Rc<RefCell<FileHandle>>;

/// The underlying stream; each variant closes differently
#[derive(Debug)]
pub enum Stream {
    /// Ordinary disk file
    Disk(Option<fs::File>),
    /// Coprocess pipe; closing reaps the child
    Pipe(Option<Child>),
    /// Standard stream wrapper, exempt from closing
    Stdio,
}

/// Open file shared between file values
#[derive(Debug)]
pub struct FileHandle {
    /// Share count: how many values alias this handle
    pub refs: u32,
    stream: Stream,
    open: bool,
}

impl FileHandle {
    /// Open a disk file for reading
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let f = fs::File::open(path)?;
        Ok(FileHandle {
            refs: 1,
            stream: Stream::Disk(Some(f)),
            open: true,
        })
    }

    /// Spawn a shell command and wrap its pipe
    pub fn open_pipe(command: &str) -> Result<Self> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .spawn()?;
        Ok(FileHandle {
            refs: 1,
            stream: Stream::Pipe(Some(child)),
            open: true,
        })
    }

    /// Wrap a standard stream; never closed by the release protocol
    pub fn stdio() -> Self {
        FileHandle {
            refs: 1,
            stream: Stream::Stdio,
            open: true,
        }
    }

    pub fn into_ref(self) -> FileRef {
        Rc::new(RefCell::new(self))
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_pipe(&self) -> bool {
        matches!(self.stream, Stream::Pipe(_))
    }

    pub fn is_stdio(&self) -> bool {
        matches!(self.stream, Stream::Stdio)
    }

    /// Close the stream along its mode-specific path. Standard-stream
    /// wrappers are exempt and stay open.
    pub fn close(&mut self) {
        match &mut self.stream {
            Stream::Disk(f) => {
                f.take();
                self.open = false;
            }
            Stream::Pipe(c) => {
                if let Some(mut child) = c.take() {
                    let _ = child.wait();
                }
                self.open = false;
            }
            Stream::Stdio => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdio_is_never_closed() {
        let mut h = FileHandle::stdio();
        assert!(h.is_open());
        h.close();
        assert!(h.is_open());
        assert!(h.is_stdio());
    }

    #[test]
    fn test_disk_file_closes() {
        let mut h = FileHandle::open(std::env::current_exe().unwrap()).unwrap();
        assert!(h.is_open());
        assert!(!h.is_pipe());
        h.close();
        assert!(!h.is_open());
        // Closing twice is harmless
        h.close();
        assert!(!h.is_open());
    }

    #[test]
    fn test_pipe_close_reaps_child() {
        let mut h = FileHandle::open_pipe("true").unwrap();
        assert!(h.is_pipe());
        h.close();
        assert!(!h.is_open());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(FileHandle::open("/no/such/path/at/all").is_err());
    }
}
