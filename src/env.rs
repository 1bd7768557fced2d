//! File system abstraction used by the table writer and reader.
//!
//! Everything that touches the disk goes through [`Env`], so tests can swap in
//! an environment that fails on demand.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

/// A sequentially written file.
pub trait WritableFile: Send {
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Pushes buffered bytes to the operating system.
    fn flush(&mut self) -> Result<()>;

    /// Makes everything appended so far durable.
    fn sync(&mut self) -> Result<()>;

    /// Flushes and releases the handle. Every other call fails afterward.
    fn close(&mut self) -> Result<()>;
}

/// A file read at arbitrary offsets, safe to share between threads.
pub trait RandomAccessFile: Send + Sync {
    /// Reads up to `len` bytes at `offset`. Fewer bytes are returned only at
    /// end of file.
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;
}

pub trait Env: Send + Sync {
    /// Creates `path`, truncating any existing file.
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>>;

    fn new_random_access_file(&self, path: &Path) -> Result<Box<dyn RandomAccessFile>>;

    fn remove_file(&self, path: &Path) -> Result<()>;

    fn file_exists(&self, path: &Path) -> bool;

    fn file_size(&self, path: &Path) -> Result<u64>;
}

/// [`Env`] backed by the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsEnv;

impl Env for FsEnv {
    fn new_writable_file(&self, path: &Path) -> Result<Box<dyn WritableFile>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(FsWritableFile {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        }))
    }

    fn new_random_access_file(&self, path: &Path) -> Result<Box<dyn RandomAccessFile>> {
        let file = File::open(path)?;
        Ok(Box::new(FsRandomAccessFile { file }))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        Ok(fs::metadata(path)?.len())
    }
}

struct FsWritableFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FsWritableFile {
    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer),
            None => Err(Error::IoError(std::io::Error::new(
                ErrorKind::Other,
                format!("{} is already closed", self.path.display()),
            ))),
        }
    }
}

impl WritableFile for FsWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer()?.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer()?.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        let writer = self.writer()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer()?.flush()?;
        self.writer = None;
        Ok(())
    }
}

struct FsRandomAccessFile {
    file: File,
}

#[cfg(unix)]
fn read_at_offset(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn read_at_offset(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

impl RandomAccessFile for FsRandomAccessFile {
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match read_at_offset(&self.file, &mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}
