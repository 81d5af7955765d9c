//! Archive streams over file handles.
//!
//! [`ArchiveWriter`] and [`ArchiveReader`] drive the codec through a
//! [`Handle`]: buffers come from the handle's strategy, bytes move through
//! [`transfer`](crate::file::transfer), and every codec outcome is checked.
//! Mapped handles are encoded and decoded in place.

use std::ops::Range;

use crate::archive::codec::{deserialize, serialize};
use crate::archive::header::{finalize_header, inspect_header, read_header, write_header_with_order, HeaderInfo};
use crate::archive::scalar::ByteOrder;
use crate::archive::schema::{Schema, MAX_HEADER_SIZE};
use crate::archive::state::IoState;
use crate::archive::value::Value;
use crate::constraints::ConstraintSet;
use crate::diagnostics::{Diagnostics, OperationStatus};
use crate::file::{allocate_ibuffer, allocate_obuffer, read, write, Buffer, Handle};
use crate::strategy::{Direction, IoMethod};
use crate::{Error, Result};

/// Sequential archive writer.
///
/// The header is written on construction with a placeholder count and
/// rewritten by [`ArchiveWriter::finish`]. Unmapped handles batch elements in
/// the buffer; mapped handles serialize straight into the mapping.
pub struct ArchiveWriter<'h> {
    handle: &'h Handle,
    buffer: Buffer<'h>,
    state: IoState,
    diags: Diagnostics,
    header: Vec<u8>,
    /// File offset of the buffer start (unmapped) or of the next record (mapped).
    offset: u64,
    pending: usize,
}

impl<'h> ArchiveWriter<'h> {
    pub fn new(handle: &'h Handle, schema: Schema) -> Result<Self> {
        Self::new_with_order(handle, schema, ByteOrder::native())
    }

    /// Starts an archive whose integers and floats use `order`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidStrategy`] if the handle cannot write
    /// - [`Error::Unsupported`] if the handle writes with direct I/O
    /// - allocation and transfer errors from the handle
    pub fn new_with_order(handle: &'h Handle, schema: Schema, order: ByteOrder) -> Result<Self> {
        if !handle.mode().has_write_access() {
            return Err(Error::InvalidStrategy("handle is not open for writing"));
        }
        if handle.strategy().write_method() == Some(IoMethod::Direct) {
            return Err(Error::Unsupported("archive streams do not use direct I/O"));
        }
        let mut state = IoState::new(schema);
        let constraints = stream_constraints(handle, Direction::Output, &state);
        let buffer = allocate_obuffer(handle, &constraints)?;

        let mut diags = Diagnostics::new();
        let mut header = vec![0u8; state.header_size()];
        let status = write_header_with_order(&mut header, &mut state, &mut diags, order);
        check(status, &diags)?;

        let mut writer = Self {
            handle,
            buffer,
            state,
            diags,
            header,
            offset: 0,
            pending: 0,
        };
        writer.put_header()?;
        Ok(writer)
    }

    /// Appends one element.
    ///
    /// # Errors
    ///
    /// [`Error::Format`] if the element does not match the schema.
    pub fn push(&mut self, element: &[Value]) -> Result<()> {
        let size = self.state.element_size();
        if self.buffer.is_mapped() {
            self.buffer.set_offset(to_usize(self.offset)?)?;
            let status = serialize(element, self.buffer.as_mut_slice()?, &mut self.state, &mut self.diags);
            check(status, &self.diags)?;
            write(self.handle, self.offset, size, &self.buffer)?;
            self.offset += size as u64;
            return Ok(());
        }

        if self.pending + size > self.buffer.size() {
            self.flush_pending()?;
        }
        let dst = &mut self.buffer.as_mut_slice()?[self.pending..];
        let status = serialize(element, dst, &mut self.state, &mut self.diags);
        check(status, &self.diags)?;
        self.pending += size;
        Ok(())
    }

    /// Overrides the count recorded in the header.
    pub fn set_element_count(&mut self, count: u64) {
        self.state.set_element_count(count);
    }

    pub fn state(&self) -> &IoState {
        &self.state
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    /// Writes buffered elements, patches the header count and flushes.
    /// Returns the recorded element count.
    pub fn finish(mut self) -> Result<u64> {
        self.flush_pending()?;
        let status = finalize_header(&mut self.header, &mut self.state, &mut self.diags);
        check(status, &self.diags)?;
        let end = self.offset;
        self.put_header()?;

        self.handle.flush()?;
        if !self.handle.is_mapped() {
            self.handle.set_len(end)?;
        }
        let count = self.state.element_count();
        log::info!(
            "wrote archive {}: {} elements, {} bytes",
            self.handle.path().display(),
            count,
            end
        );
        Ok(count)
    }

    /// Copies the header bytes to file offset 0.
    fn put_header(&mut self) -> Result<()> {
        let len = self.header.len();
        if self.buffer.is_mapped() {
            self.buffer.set_offset(0)?;
            self.buffer.as_mut_slice()?[..len].copy_from_slice(&self.header);
            write(self.handle, 0, len, &self.buffer)?;
            if self.offset == 0 {
                self.offset = len as u64;
            }
            return Ok(());
        }
        if self.offset == 0 && self.pending == 0 {
            // First write: the header leads the batch.
            self.buffer.as_mut_slice()?[..len].copy_from_slice(&self.header);
            self.pending = len;
            return Ok(());
        }
        let mut scratch = Buffer::allocate(&ConstraintSet::new().with_at_least(len)?)?;
        scratch.as_mut_slice()?.copy_from_slice(&self.header);
        write(self.handle, 0, len, &scratch)?;
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        write(self.handle, self.offset, self.pending, &self.buffer)?;
        self.offset += self.pending as u64;
        self.pending = 0;
        Ok(())
    }
}

/// Archive reader with random access to elements.
pub struct ArchiveReader<'h> {
    handle: &'h Handle,
    buffer: Buffer<'h>,
    state: IoState,
    diags: Diagnostics,
    /// File range currently held by an unmapped buffer.
    window: Range<u64>,
    next: u64,
}

impl<'h> ArchiveReader<'h> {
    /// Opens an archive and verifies its header against `schema`.
    ///
    /// # Errors
    ///
    /// [`Error::Format`] carrying the critical header diagnostic if
    /// verification fails.
    pub fn new(handle: &'h Handle, schema: Schema) -> Result<Self> {
        if !handle.mode().has_read_access() {
            return Err(Error::InvalidStrategy("handle is not open for reading"));
        }
        if handle.strategy().read_method() == Some(IoMethod::Direct) {
            return Err(Error::Unsupported("archive streams do not use direct I/O"));
        }
        let state = IoState::new(schema);
        let constraints = stream_constraints(handle, Direction::Input, &state);
        let buffer = allocate_ibuffer(handle, &constraints)?;
        let mut reader = Self {
            handle,
            buffer,
            state,
            diags: Diagnostics::new(),
            window: 0..0,
            next: 0,
        };

        let range = reader.fill(0, reader.state.header_size())?;
        let bytes = &reader.buffer.as_slice()[range];
        let status = read_header(bytes, &mut reader.state, &mut reader.diags);
        check(status, &reader.diags)?;
        log::debug!(
            "opened archive {} ({}, {} elements)",
            handle.path().display(),
            reader.state.byte_order(),
            reader.state.element_count()
        );
        Ok(reader)
    }

    /// Opens an archive with whatever schema its header declares.
    pub fn open_inspected(handle: &'h Handle) -> Result<Self> {
        let info = read_header_info(handle)?;
        Self::new(handle, info.schema)
    }

    pub fn element_count(&self) -> u64 {
        self.state.element_count()
    }

    pub fn schema(&self) -> &Schema {
        self.state.schema()
    }

    pub fn state(&self) -> &IoState {
        &self.state
    }

    /// Mutable codec state, e.g. to request materialized matrices.
    pub fn state_mut(&mut self) -> &mut IoState {
        &mut self.state
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    /// Decodes element `index`.
    ///
    /// # Errors
    ///
    /// - [`Error::OutOfBounds`] past the recorded element count
    /// - [`Error::Format`] if the file ends early
    pub fn read_element(&mut self, index: u64) -> Result<&[Value]> {
        if index >= self.state.element_count() {
            return Err(Error::OutOfBounds("element index past end of archive"));
        }
        let size = self.state.element_size();
        let offset = (size as u64)
            .checked_mul(index)
            .and_then(|o| o.checked_add(self.state.header_size() as u64))
            .ok_or(Error::OutOfBounds("element offset overflow"))?;
        let range = self.fill(offset, size)?;
        let bytes = &self.buffer.as_slice()[range];
        let status = deserialize(bytes, &mut self.state, &mut self.diags);
        check(status, &self.diags)?;
        self.next = index + 1;
        Ok(self.state.element())
    }

    /// Decodes the element after the last one read, or `None` at the end.
    pub fn next_element(&mut self) -> Result<Option<&[Value]>> {
        if self.next >= self.state.element_count() {
            return Ok(None);
        }
        self.read_element(self.next).map(Some)
    }

    /// Makes `offset..offset + len` of the file available in the buffer and
    /// returns its position there.
    fn fill(&mut self, offset: u64, len: usize) -> Result<Range<usize>> {
        let end = offset + len as u64;
        if self.buffer.is_mapped() {
            if self.handle.size_limit().is_some_and(|limit| end > limit) {
                return Err(Error::Format("unexpected end of archive".into()));
            }
            read(self.handle, offset, len, &mut self.buffer)?;
            return Ok(0..len);
        }

        if offset >= self.window.start && end <= self.window.end {
            let start = (offset - self.window.start) as usize;
            return Ok(start..start + len);
        }
        let available = self
            .handle
            .size_limit()
            .map_or(u64::MAX, |limit| limit.saturating_sub(offset));
        if available < len as u64 {
            return Err(Error::Format("unexpected end of archive".into()));
        }
        let want = (self.buffer.size() as u64).min(available) as usize;
        let got = read(self.handle, offset, want.max(len), &mut self.buffer)?;
        if got < len {
            return Err(Error::Format("unexpected end of archive".into()));
        }
        self.window = offset..offset + got as u64;
        Ok(0..len)
    }
}

impl std::fmt::Debug for ArchiveReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("path", &self.handle.path())
            .field("schema", self.state.schema())
            .field("elements", &self.state.element_count())
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// Reads and parses the header of the archive behind `handle` without an
/// expected schema.
pub fn read_header_info(handle: &Handle) -> Result<HeaderInfo> {
    let size = handle
        .size_limit()
        .ok_or(Error::InvalidStrategy("archive size unknown"))?;
    let len = size.min(MAX_HEADER_SIZE as u64) as usize;
    if len == 0 {
        return Err(Error::Format("unexpected end of header".into()));
    }
    let mut buffer = allocate_ibuffer(handle, &ConstraintSet::new().with_at_least(len)?)?;
    let got = read(handle, 0, len, &mut buffer)?;
    inspect_header(&buffer.as_slice()[..got])
}

/// Buffer shape for a stream: the codec's minimum, tightened by the
/// strategy's required set and steered by its preferred set.
fn stream_constraints(handle: &Handle, direction: Direction, state: &IoState) -> ConstraintSet {
    let strategy = handle.strategy().constraints(direction);
    let base = state.buffer_constraints();
    base.merge_strong(&strategy.required)
        .unwrap_or(base)
        .merge_weak(&strategy.preferred)
}

/// Maps a codec outcome to a `Result`.
fn check(status: OperationStatus, diags: &Diagnostics) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if status.is_incomplete() {
        return Err(Error::OutOfBounds("buffer cannot hold an archive record"));
    }
    let message = diags
        .last_critical()
        .map_or_else(|| format!("codec step failed ({status})"), |record| record.to_string());
    Err(Error::Format(message))
}

fn to_usize(offset: u64) -> Result<usize> {
    usize::try_from(offset).map_err(|_| Error::OutOfBounds("offset exceeds address space"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::scalar::ScalarType;
    use crate::archive::schema::Component;
    use crate::strategy::{AccessPattern, IoStrategy, OpenMode, StrategyConfig};

    fn schema() -> Schema {
        Schema::new(vec![
            Component::Scalar(ScalarType::U32),
            Component::Vector {
                scalar: ScalarType::F32,
                len: 5,
            },
        ])
        .expect("valid schema")
    }

    fn element(i: u32) -> Vec<Value> {
        vec![Value::scalar(i), Value::vector(vec![i as f32 * 0.5; 5])]
    }

    #[test]
    fn paged_round_trip_with_small_batches() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.arc");
        let config = StrategyConfig::for_host();
        let mut strategy = IoStrategy::for_path(&path, OpenMode::CreateOrReplace, AccessPattern::Sequential, None, &config)?;
        // Preferred sizes would batch everything; force several flushes.
        strategy.constraints_mut(Direction::Output).preferred = ConstraintSet::new().with_at_least(64)?;
        let handle = Handle::open(&path, OpenMode::CreateOrReplace, &strategy)?;
        let mut writer = ArchiveWriter::new(&handle, schema())?;
        for i in 0..20 {
            writer.push(&element(i))?;
        }
        assert_eq!(writer.finish()?, 20);
        handle.close()?;

        let expected_len = schema().header_size() + 20 * schema().element_size();
        assert_eq!(std::fs::metadata(&path)?.len(), expected_len as u64);

        let strategy = IoStrategy::for_path(&path, OpenMode::Read, AccessPattern::Sequential, None, &config)?;
        let handle = Handle::open(&path, OpenMode::Read, &strategy)?;
        let mut reader = ArchiveReader::new(&handle, schema())?;
        assert_eq!(reader.element_count(), 20);
        let mut seen = 0;
        while let Some(element) = reader.next_element()? {
            assert_eq!(element, &self::element(seen)[..]);
            seen += 1;
        }
        assert_eq!(seen, 20);
        assert_eq!(reader.read_element(7)?, &self::element(7)[..]);
        assert!(matches!(reader.read_element(20), Err(Error::OutOfBounds(_))));
        Ok(())
    }

    #[test]
    fn mismatched_schema_reports_header_diagnostic() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("b.arc");
        let config = StrategyConfig::for_host();
        let strategy = IoStrategy::for_path(&path, OpenMode::CreateOrReplace, AccessPattern::Sequential, None, &config)?;
        let handle = Handle::open(&path, OpenMode::CreateOrReplace, &strategy)?;
        let mut writer = ArchiveWriter::new(&handle, schema())?;
        writer.push(&element(1))?;
        writer.finish()?;
        handle.close()?;

        let strategy = IoStrategy::for_path(&path, OpenMode::Read, AccessPattern::Sequential, None, &config)?;
        let handle = Handle::open(&path, OpenMode::Read, &strategy)?;
        let other = Schema::new(vec![
            Component::Scalar(ScalarType::I32),
            Component::Vector {
                scalar: ScalarType::F32,
                len: 5,
            },
        ])?;
        match ArchiveReader::new(&handle, other) {
            Err(Error::Format(message)) => assert!(message.contains("mismatching scalar types"), "{message}"),
            result => panic!("expected a format error, got {result:?}"),
        }

        let info = read_header_info(&handle)?;
        assert_eq!(info.schema, schema());
        assert_eq!(info.element_count, 1);
        Ok(())
    }

    #[test]
    fn direct_handles_are_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("c.arc");
        std::fs::write(&path, [0u8; 4096])?;
        let config = StrategyConfig::for_host();
        let strategy = IoStrategy::for_path(&path, OpenMode::Read, AccessPattern::Random, None, &config)?;
        let handle = Handle::open(&path, OpenMode::Read, &strategy)?;
        assert!(matches!(ArchiveReader::new(&handle, schema()), Err(Error::Unsupported(_))));
        Ok(())
    }
}
