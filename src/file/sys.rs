//! Thin wrappers over the platform calls the file layer needs.
//!
//! Every wrapper reports failure through [`crate::Error::Io`] with the raw OS
//! error preserved. Calls that have no equivalent on the host are no-ops.

use std::fs::File;
use std::path::Path;

use crate::Result;

const FALLBACK_PAGE_SIZE: usize = 4096;
const FALLBACK_BLOCK_SIZE: u64 = 4096;

/// Size and preferred I/O block size of a filesystem object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub size: u64,
    pub block_size: u64,
}

pub fn page_size() -> usize {
    #[cfg(unix)]
    {
        let rc = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if rc > 0 {
            return rc as usize;
        }
    }
    FALLBACK_PAGE_SIZE
}

pub fn stat(path: &Path) -> Result<Stat> {
    let meta = std::fs::metadata(path)?;
    Ok(Stat {
        size: meta.len(),
        block_size: block_size_of(&meta),
    })
}

pub fn fstat(file: &File) -> Result<Stat> {
    let meta = file.metadata()?;
    Ok(Stat {
        size: meta.len(),
        block_size: block_size_of(&meta),
    })
}

#[cfg(unix)]
fn block_size_of(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    match meta.blksize() {
        0 => FALLBACK_BLOCK_SIZE,
        blk => blk,
    }
}

#[cfg(not(unix))]
fn block_size_of(_meta: &std::fs::Metadata) -> u64 {
    FALLBACK_BLOCK_SIZE
}

/// Extra `open(2)` flag requesting unbuffered transfers, or 0.
pub fn direct_open_flag() -> i32 {
    #[cfg(target_os = "linux")]
    {
        libc::O_DIRECT
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

/// Extra `open(2)` flag suppressing access-time updates, or 0.
pub fn noatime_open_flag() -> i32 {
    #[cfg(target_os = "linux")]
    {
        libc::O_NOATIME
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

/// Hints that `file` will be read front to back.
///
/// `bounded` selects a one-shot advisory read of `len` bytes where the host
/// distinguishes it from open-ended read-ahead.
#[cfg(target_os = "linux")]
pub fn advise_sequential(file: &File, len: u64, _bounded: bool) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    let rc = unsafe {
        libc::posix_fadvise(
            file.as_raw_fd(),
            0,
            len as libc::off_t,
            libc::POSIX_FADV_SEQUENTIAL,
        )
    };
    if rc != 0 {
        return Err(std::io::Error::from_raw_os_error(rc).into());
    }
    Ok(())
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn advise_sequential(file: &File, len: u64, bounded: bool) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    let rc = if bounded {
        let advice = libc::radvisory {
            ra_offset: 0,
            ra_count: len.min(i32::MAX as u64) as libc::c_int,
        };
        unsafe { libc::fcntl(fd, libc::F_RDADVISE, &advice) }
    } else {
        unsafe { libc::fcntl(fd, libc::F_RDAHEAD, 1) }
    };
    if rc == -1 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios")))]
pub fn advise_sequential(_file: &File, _len: u64, _bounded: bool) -> Result<()> {
    Ok(())
}

/// Reserves disk space so that `file` is at least `len` bytes long.
#[cfg(target_os = "linux")]
pub fn preallocate(file: &File, len: u64) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    loop {
        let rc = unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, len as libc::off_t) };
        match rc {
            0 => return Ok(()),
            libc::EINTR => continue,
            // Filesystems without fallocate support still get the length.
            libc::EOPNOTSUPP | libc::ENOSYS => break,
            err => return Err(std::io::Error::from_raw_os_error(err).into()),
        }
    }
    grow_to(file, len)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn preallocate(file: &File, len: u64) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    let mut store = libc::fstore_t {
        fst_flags: libc::F_ALLOCATEALL,
        fst_posmode: libc::F_PEOFPOSMODE,
        fst_offset: 0,
        fst_length: len as libc::off_t,
        fst_bytesalloc: 0,
    };
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_PREALLOCATE, &mut store) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error().into());
    }
    grow_to(file, len)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios")))]
pub fn preallocate(file: &File, len: u64) -> Result<()> {
    grow_to(file, len)
}

/// Extends `file` to `len` bytes; never shrinks it.
pub fn grow_to(file: &File, len: u64) -> Result<()> {
    if file.metadata()?.len() < len {
        file.set_len(len)?;
    }
    Ok(())
}

/// Disables the page cache for `file` on hosts that do so per descriptor.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn disable_cache(file: &File) -> Result<()> {
    use std::os::unix::io::AsRawFd;
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub fn disable_cache(_file: &File) -> Result<()> {
    Ok(())
}
