//! Positioned transfers between a [`Handle`] and a [`Buffer`].
//!
//! Paged and direct mechanisms copy through positioned reads and writes,
//! continuing after short transfers and `EINTR`. Mapped mechanisms copy to or
//! from the mapping, or only move the buffer's window when the buffer is a
//! view of the same mapping.

use std::fs::File;
use std::io::ErrorKind;

use crate::file::buffer::Buffer;
use crate::file::handle::{Handle, Mapping};
use crate::strategy::IoMethod;
use crate::{Error, Result};

/// Reads `len` bytes at `offset` into the front of `buffer`.
///
/// Returns the number of bytes now available in `buffer`. This is `len`
/// unless end of file was reached first.
///
/// # Errors
///
/// - [`Error::InvalidArgument`] if `len` is zero
/// - [`Error::OutOfBounds`] if the range passes the file size or the buffer
/// - [`Error::Io`] on a failed system call
pub fn read(handle: &Handle, offset: u64, len: usize, buffer: &mut Buffer<'_>) -> Result<usize> {
    if !handle.mode().has_read_access() {
        return Err(Error::InvalidStrategy("handle is not open for reading"));
    }
    check_range(handle, offset, len)?;

    match handle.strategy().read_method() {
        Some(IoMethod::Mapped) => {
            let mapping = mapping_of(handle)?;
            let start = mapping_offset(mapping, offset, len)?;
            if buffer.aliases(handle) {
                buffer.set_offset(start)?;
            } else {
                let dst = buffer_prefix_mut(buffer, len)?;
                mapping.copy_out(start, dst)?;
            }
            Ok(len)
        }
        Some(IoMethod::Paged | IoMethod::Direct) => {
            let dst = buffer_prefix_mut(buffer, len)?;
            read_full_at(handle.file(), offset, dst)
        }
        None => Err(Error::InvalidStrategy("no read mechanism chosen")),
    }
}

/// Writes the first `len` bytes of `buffer` at `offset`.
///
/// A buffer aliasing the handle's mapping already holds the data in place,
/// so nothing is copied; [`Handle::flush`] persists it.
pub fn write(handle: &Handle, offset: u64, len: usize, buffer: &Buffer<'_>) -> Result<usize> {
    if !handle.mode().has_write_access() {
        return Err(Error::InvalidStrategy("handle is not open for writing"));
    }
    check_range(handle, offset, len)?;
    if len > buffer.size() {
        return Err(Error::OutOfBounds("transfer exceeds buffer size"));
    }

    match handle.strategy().write_method() {
        Some(IoMethod::Mapped) => {
            let mapping = mapping_of(handle)?;
            let start = mapping_offset(mapping, offset, len)?;
            if !buffer.aliases(handle) {
                mapping.copy_in(start, &buffer.as_slice()[..len])?;
            }
            Ok(len)
        }
        Some(IoMethod::Paged | IoMethod::Direct) => {
            write_full_at(handle.file(), offset, &buffer.as_slice()[..len])?;
            Ok(len)
        }
        None => Err(Error::InvalidStrategy("no write mechanism chosen")),
    }
}

fn check_range(handle: &Handle, offset: u64, len: usize) -> Result<()> {
    if len == 0 {
        return Err(Error::InvalidArgument("transfer length must be non-zero"));
    }
    let end = offset
        .checked_add(len as u64)
        .ok_or(Error::OutOfBounds("transfer range overflow"))?;
    if let Some(limit) = handle.size_limit() {
        if end > limit {
            return Err(Error::OutOfBounds("transfer exceeds file size"));
        }
    }
    Ok(())
}

fn mapping_of(handle: &Handle) -> Result<&Mapping> {
    handle
        .mapping()
        .ok_or(Error::InvalidStrategy("mapped mechanism without a mapping"))
}

fn mapping_offset(mapping: &Mapping, offset: u64, len: usize) -> Result<usize> {
    let start = usize::try_from(offset).map_err(|_| Error::OutOfBounds("offset exceeds address space"))?;
    match start.checked_add(len) {
        Some(end) if end <= mapping.len() => Ok(start),
        _ => Err(Error::OutOfBounds("transfer exceeds mapping")),
    }
}

fn buffer_prefix_mut<'a>(buffer: &'a mut Buffer<'_>, len: usize) -> Result<&'a mut [u8]> {
    if len > buffer.size() {
        return Err(Error::OutOfBounds("transfer exceeds buffer size"));
    }
    Ok(&mut buffer.as_mut_slice()?[..len])
}

fn read_full_at(file: &File, mut offset: u64, buf: &mut [u8]) -> Result<usize> {
    let mut done = 0;
    while done < buf.len() {
        match read_at(file, &mut buf[done..], offset) {
            Ok(0) => break,
            Ok(n) => {
                done += n;
                offset += n as u64;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(done)
}

fn write_full_at(file: &File, mut offset: u64, buf: &[u8]) -> Result<()> {
    let mut done = 0;
    while done < buf.len() {
        match write_at(file, &buf[done..], offset) {
            Ok(0) => {
                return Err(std::io::Error::new(ErrorKind::WriteZero, "positioned write made no progress").into())
            }
            Ok(n) => {
                done += n;
                offset += n as u64;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(not(unix))]
fn read_at(mut file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::io::{Read, Seek, SeekFrom};
    file.seek(SeekFrom::Start(offset))?;
    file.read(buf)
}

#[cfg(not(unix))]
fn write_at(mut file: &File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    use std::io::{Seek, SeekFrom, Write};
    file.seek(SeekFrom::Start(offset))?;
    file.write(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintSet;
    use crate::file::allocate::{allocate_ibuffer, allocate_obuffer};
    use crate::strategy::{AccessPattern, IoStrategy, OpenMode, StrategyConfig};

    #[test]
    fn read_stops_at_end_of_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("short.bin");
        std::fs::write(&path, b"0123456789")?;
        let mut strategy =
            IoStrategy::for_path(&path, OpenMode::Modify, AccessPattern::Sequential, Some(64), &StrategyConfig::for_host())?;
        strategy.set_read_method(IoMethod::Paged)?;
        strategy.set_write_method(IoMethod::Paged)?;
        strategy.set_preallocate(false);
        let handle = Handle::open(&path, OpenMode::Modify, &strategy)?;
        let mut buf = allocate_ibuffer(&handle, &ConstraintSet::new().with_at_least(32)?)?;
        assert_eq!(read(&handle, 4, 32, &mut buf)?, 6);
        assert_eq!(&buf.as_slice()[..6], b"456789");
        Ok(())
    }

    #[test]
    fn rejects_empty_and_oversized_transfers() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [5u8; 100])?;
        let strategy =
            IoStrategy::for_path(&path, OpenMode::Read, AccessPattern::Sequential, None, &StrategyConfig::for_host())?;
        let handle = Handle::open(&path, OpenMode::Read, &strategy)?;
        let mut buf = allocate_ibuffer(&handle, &ConstraintSet::new().with_at_least(64)?)?;
        assert!(matches!(read(&handle, 0, 0, &mut buf), Err(Error::InvalidArgument(_))));
        assert!(matches!(read(&handle, 90, 20, &mut buf), Err(Error::OutOfBounds(_))));
        assert!(matches!(read(&handle, 0, 80, &mut buf), Err(Error::OutOfBounds(_))));
        assert!(matches!(write(&handle, 0, 8, &buf), Err(Error::InvalidStrategy(_))));
        Ok(())
    }

    #[test]
    fn paged_write_lands_at_offset() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.bin");
        let strategy = IoStrategy::for_path(
            &path,
            OpenMode::CreateOrReplace,
            AccessPattern::Sequential,
            None,
            &StrategyConfig::for_host(),
        )?;
        let handle = Handle::open(&path, OpenMode::CreateOrReplace, &strategy)?;
        let mut buf = allocate_obuffer(&handle, &ConstraintSet::new().with_at_least(4)?)?;
        buf.as_mut_slice()?.copy_from_slice(b"wxyz");
        assert_eq!(write(&handle, 6, 4, &buf)?, 4);
        drop(buf);
        handle.close()?;
        assert_eq!(std::fs::read(&path)?, b"\0\0\0\0\0\0wxyz");
        Ok(())
    }
}
