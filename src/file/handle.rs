use std::cell::Cell;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use memmap2::{Mmap, MmapMut, MmapOptions};

use crate::file::sys;
use crate::strategy::{IoMethod, IoStrategy, OpenMode};
use crate::{Error, Result};

/// Access granted by a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl MapAccess {
    pub fn readable(self) -> bool {
        matches!(self, MapAccess::ReadOnly | MapAccess::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, MapAccess::WriteOnly | MapAccess::ReadWrite)
    }
}

enum MapKind {
    ReadOnly(Mmap),
    Writable(MmapMut),
}

/// A shared file mapping owned by a [`Handle`].
///
/// At most one mapped [`Buffer`](crate::file::Buffer) views the mapping at a
/// time. While that view is alive, copies through the handle are refused.
pub struct Mapping {
    map: MapKind,
    base: NonNull<u8>,
    len: usize,
    access: MapAccess,
    leased: Cell<bool>,
}

// SAFETY: `base` points into memory owned by `map`, which moves with it.
unsafe impl Send for Mapping {}

impl Mapping {
    fn new(file: &File, len: usize, access: MapAccess) -> Result<Self> {
        if len == 0 {
            return Err(Error::Unsupported("mmap length must be non-zero"));
        }
        let (map, base) = if access.writable() {
            let mut map = unsafe { MmapOptions::new().len(len).map_mut(file)? };
            let base = NonNull::new(map.as_mut_ptr());
            (MapKind::Writable(map), base)
        } else {
            let map = unsafe { MmapOptions::new().len(len).map(file)? };
            let base = NonNull::new(map.as_ptr() as *mut u8);
            (MapKind::ReadOnly(map), base)
        };
        let base = base.ok_or(Error::Unsupported("mapping has no base address"))?;
        Ok(Self {
            map,
            base,
            len,
            access,
            leased: Cell::new(false),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn access(&self) -> MapAccess {
        self.access
    }

    /// True while a mapped buffer views this mapping.
    pub fn is_leased(&self) -> bool {
        self.leased.get()
    }

    pub(crate) fn lease(&self) -> Result<()> {
        if self.leased.replace(true) {
            return Err(Error::Unsupported("mapping already in use"));
        }
        Ok(())
    }

    pub(crate) fn release(&self) {
        self.leased.set(false);
    }

    fn ensure_unleased(&self) -> Result<()> {
        if self.leased.get() {
            return Err(Error::Unsupported("mapping already in use"));
        }
        Ok(())
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        // SAFETY: `base..base+len` is the live mapping owned by `self.map`.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    /// Mutable view of `offset..len`.
    ///
    /// # Safety
    ///
    /// The caller must hold the lease and must not hold any other reference
    /// into the same range while the returned slice is alive.
    pub(crate) unsafe fn tail_mut(&self, offset: usize) -> Result<&mut [u8]> {
        if !self.access.writable() {
            return Err(Error::ReadOnlyBuffer);
        }
        if offset > self.len {
            return Err(Error::OutOfBounds("mapping offset past end"));
        }
        Ok(std::slice::from_raw_parts_mut(
            self.base.as_ptr().add(offset),
            self.len - offset,
        ))
    }

    fn range_check(&self, offset: usize, len: usize) -> Result<()> {
        let end = offset
            .checked_add(len)
            .ok_or(Error::OutOfBounds("range overflow"))?;
        if end > self.len {
            return Err(Error::OutOfBounds("range past end of mapping"));
        }
        Ok(())
    }

    pub(crate) fn copy_out(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        self.ensure_unleased()?;
        self.range_check(offset, dst.len())?;
        dst.copy_from_slice(&self.as_slice()[offset..offset + dst.len()]);
        Ok(())
    }

    pub(crate) fn copy_in(&self, offset: usize, src: &[u8]) -> Result<()> {
        if !self.access.writable() {
            return Err(Error::ReadOnlyBuffer);
        }
        self.ensure_unleased()?;
        self.range_check(offset, src.len())?;
        // SAFETY: range checked above and no buffer views the mapping.
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.base.as_ptr().add(offset), src.len());
        }
        Ok(())
    }

    pub(crate) fn base(&self) -> *const u8 {
        self.base.as_ptr()
    }

    fn flush(&self) -> Result<()> {
        if let MapKind::Writable(map) = &self.map {
            map.flush()?;
        }
        Ok(())
    }
}

/// An open file plus the mapping its strategy calls for.
pub struct Handle {
    file: File,
    path: PathBuf,
    mode: OpenMode,
    strategy: IoStrategy,
    mapping: Option<Mapping>,
    direct: bool,
}

impl Handle {
    /// Opens `path` for `mode` following `strategy`.
    ///
    /// The sequence is: validate the strategy, open with the mode's flags
    /// (plus the direct-I/O flag when an active direction uses it), apply
    /// read-ahead and preallocation advice, then map the file if an active
    /// direction is mapped. Advice failures are logged and ignored.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidStrategy`] if the strategy is invalid or was planned
    ///   for a different direction
    /// - [`Error::Io`] if opening, growing or mapping the file fails
    pub fn open(path: &Path, mode: OpenMode, strategy: &IoStrategy) -> Result<Self> {
        strategy.validate()?;
        if strategy.direction() != mode.direction() {
            return Err(Error::InvalidStrategy("strategy direction does not match open mode"));
        }

        let reads = mode.has_read_access();
        let writes = mode.has_write_access();
        let read_method = strategy.read_method().filter(|_| reads);
        let write_method = strategy.write_method().filter(|_| writes);
        let wants_direct = read_method == Some(IoMethod::Direct) || write_method == Some(IoMethod::Direct);

        let (file, direct) = open_file(path, mode, wants_direct)?;

        if wants_direct {
            if let Err(err) = sys::disable_cache(&file) {
                log::warn!("failed to disable page cache for {}: {err}", path.display());
            }
        }

        if reads && strategy.read_ahead() {
            let len = strategy.current_size().unwrap_or(0);
            let bounded = len < strategy.large_file_threshold();
            if let Err(err) = sys::advise_sequential(&file, len, bounded) {
                log::warn!("read-ahead advice failed for {}: {err}", path.display());
            }
        }

        if writes && strategy.preallocate() {
            if let Some(expected) = strategy.expected_size() {
                if let Err(err) = sys::preallocate(&file, expected) {
                    log::warn!("preallocation of {expected} bytes failed for {}: {err}", path.display());
                }
            }
        }

        let mapping = if write_method == Some(IoMethod::Mapped) {
            let expected = strategy
                .expected_size()
                .ok_or(Error::InvalidStrategy("mapped output requires the expected size"))?;
            sys::grow_to(&file, expected)?;
            let access = if reads { MapAccess::ReadWrite } else { MapAccess::WriteOnly };
            Some(Mapping::new(&file, to_len(expected)?, access)?)
        } else if read_method == Some(IoMethod::Mapped) {
            let current = strategy
                .current_size()
                .ok_or(Error::InvalidStrategy("mapped input requires the current size"))?;
            if sys::fstat(&file)?.size < current {
                return Err(Error::InvalidStrategy("file is shorter than the planned mapping"));
            }
            let access = if writes { MapAccess::ReadWrite } else { MapAccess::ReadOnly };
            Some(Mapping::new(&file, to_len(current)?, access)?)
        } else {
            None
        };

        if let Some(mapping) = &mapping {
            log::debug!("mapped {} bytes of {} ({:?})", mapping.len(), path.display(), mapping.access());
        }
        log::info!(
            "opened {} mode={mode} read={:?} write={:?} direct={direct}",
            path.display(),
            read_method,
            write_method
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
            strategy: strategy.clone(),
            mapping,
            direct,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn strategy(&self) -> &IoStrategy {
        &self.strategy
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// True if the descriptor bypasses the page cache.
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    pub fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn mapping(&self) -> Option<&Mapping> {
        self.mapping.as_ref()
    }

    /// Upper bound for transfers: the expected size when writing, otherwise
    /// the current size.
    pub fn size_limit(&self) -> Option<u64> {
        if self.mode.has_write_access() {
            self.strategy.expected_size().or(if self.mode.has_read_access() {
                self.strategy.current_size()
            } else {
                None
            })
        } else {
            self.strategy.current_size()
        }
    }

    /// Writes dirty mapped pages, or file data when unmapped, to storage.
    pub fn flush(&self) -> Result<()> {
        match &self.mapping {
            Some(mapping) => mapping.flush(),
            None => {
                if self.mode.has_write_access() {
                    self.file.sync_data()?;
                }
                Ok(())
            }
        }
    }

    /// Resizes the file. Not available while the file is mapped.
    pub fn set_len(&self, len: u64) -> Result<()> {
        if self.mapping.is_some() {
            return Err(Error::Unsupported("cannot resize a mapped file"));
        }
        self.file.set_len(len)?;
        Ok(())
    }

    /// Flushes, unmaps and returns the underlying file.
    pub fn into_file(mut self) -> Result<File> {
        if let Some(mapping) = self.mapping.take() {
            mapping.flush()?;
        }
        Ok(self.file)
    }

    pub fn close(self) -> Result<()> {
        self.into_file().map(drop)
    }
}

fn to_len(size: u64) -> Result<usize> {
    usize::try_from(size).map_err(|_| Error::Unsupported("mapping exceeds addressable range"))
}

/// Opens with the mode's flags and returns whether direct I/O is active.
///
/// `O_NOATIME` is dropped on `EPERM` (caller does not own the file) and the
/// direct flag is dropped on `EINVAL` (filesystem without direct I/O).
fn open_file(path: &Path, mode: OpenMode, direct: bool) -> Result<(File, bool)> {
    let noatime = if mode == OpenMode::Read { sys::noatime_open_flag() } else { 0 };
    let mut flags = noatime;
    let mut direct = direct;
    if direct {
        flags |= sys::direct_open_flag();
    }
    loop {
        match open_with_flags(path, mode, flags) {
            Ok(file) => return Ok((file, direct)),
            Err(err) if err.raw_os_error() == Some(libc::EPERM) && noatime != 0 && flags & noatime != 0 => {
                flags &= !noatime;
            }
            Err(err)
                if err.raw_os_error() == Some(libc::EINVAL)
                    && direct
                    && sys::direct_open_flag() != 0 =>
            {
                log::warn!(
                    "direct I/O unsupported for {}, falling back to buffered access",
                    path.display()
                );
                flags &= !sys::direct_open_flag();
                direct = false;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(unix)]
fn open_with_flags(path: &Path, mode: OpenMode, flags: i32) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut options = mode.options();
    options.custom_flags(flags);
    options.open(path)
}

#[cfg(not(unix))]
fn open_with_flags(path: &Path, mode: OpenMode, _flags: i32) -> std::io::Result<File> {
    mode.options().open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{AccessPattern, Direction, FileMetadata, StrategyConfig};

    fn config() -> StrategyConfig {
        StrategyConfig::for_host()
    }

    #[test]
    fn read_mapping_covers_current_size() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.bin");
        std::fs::write(&path, (0u8..=255).collect::<Vec<_>>())?;

        let mut strategy = IoStrategy::for_path(&path, OpenMode::Read, AccessPattern::Sequential, None, &config())?;
        strategy.set_read_method(IoMethod::Mapped)?;
        let handle = Handle::open(&path, OpenMode::Read, &strategy)?;
        let mapping = handle.mapping().expect("mapped");
        assert_eq!(mapping.len(), 256);
        assert_eq!(mapping.access(), MapAccess::ReadOnly);
        assert_eq!(mapping.as_slice()[255], 255);
        Ok(())
    }

    #[test]
    fn write_mapping_grows_file_to_expected_size() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.bin");
        let metadata = FileMetadata::probe(&path, Some(10_000))?;
        let mut strategy = IoStrategy::select(Direction::Output, AccessPattern::Sequential, metadata, &config())?;
        strategy.set_write_method(IoMethod::Mapped)?;

        let handle = Handle::open(&path, OpenMode::CreateOrReplace, &strategy)?;
        let mapping = handle.mapping().expect("mapped");
        assert_eq!(mapping.len(), 10_000);
        assert_eq!(mapping.access(), MapAccess::WriteOnly);
        mapping.copy_in(9_996, b"tail")?;
        handle.close()?;

        let bytes = std::fs::read(&path)?;
        assert_eq!(bytes.len(), 10_000);
        assert_eq!(&bytes[9_996..], b"tail");
        Ok(())
    }

    #[test]
    fn mapping_is_leased_to_one_buffer() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.bin");
        let metadata = FileMetadata::probe(&path, Some(4_096))?;
        let mut strategy = IoStrategy::select(Direction::Output, AccessPattern::Sequential, metadata, &config())?;
        strategy.set_write_method(IoMethod::Mapped)?;
        let handle = Handle::open(&path, OpenMode::CreateOrReplace, &strategy)?;
        let mapping = handle.mapping().expect("mapped");

        let mut first = crate::file::Buffer::mapped(mapping)?;
        assert!(matches!(
            crate::file::Buffer::mapped(mapping),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(mapping.copy_in(0, b"x"), Err(Error::Unsupported(_))));
        let mut out = [0u8; 1];
        assert!(matches!(mapping.copy_out(0, &mut out), Err(Error::Unsupported(_))));
        first.as_mut_slice()?[0] = 9;
        drop(first);

        assert!(!mapping.is_leased());
        mapping.copy_out(0, &mut out)?;
        assert_eq!(out, [9]);
        let second = crate::file::Buffer::mapped(mapping)?;
        assert!(mapping.is_leased());
        drop(second);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_direction() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [1u8; 64])?;
        let strategy = IoStrategy::for_path(&path, OpenMode::Read, AccessPattern::Sequential, None, &config())?;
        let err = Handle::open(&path, OpenMode::Modify, &strategy);
        assert!(matches!(err, Err(Error::InvalidStrategy(_))));
        Ok(())
    }

    #[test]
    fn read_only_mapping_refuses_writes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("data.bin");
        std::fs::write(&path, [1u8; 64])?;
        let mut strategy = IoStrategy::for_path(&path, OpenMode::Read, AccessPattern::Sequential, None, &config())?;
        strategy.set_read_method(IoMethod::Mapped)?;
        let handle = Handle::open(&path, OpenMode::Read, &strategy)?;
        let mapping = handle.mapping().expect("mapped");
        assert!(matches!(mapping.copy_in(0, b"x"), Err(Error::ReadOnlyBuffer)));
        Ok(())
    }

    #[test]
    fn empty_file_cannot_be_mapped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"")?;
        let mut strategy = IoStrategy::for_path(&path, OpenMode::Read, AccessPattern::Sequential, None, &config())?;
        strategy.set_read_method(IoMethod::Mapped)?;
        assert!(matches!(
            Handle::open(&path, OpenMode::Read, &strategy),
            Err(Error::Unsupported(_))
        ));
        Ok(())
    }
}
