//! Buffer allocation against a handle's strategy.
//!
//! Each function checks the caller's constraints against the strategy's
//! required set for the direction. Mapped directions hand out a view of the
//! handle's mapping; every other mechanism gets a fresh allocation.

use crate::constraints::ConstraintSet;
use crate::file::buffer::Buffer;
use crate::file::handle::Handle;
use crate::strategy::{Direction, IoMethod};
use crate::{Error, Result};

/// Buffer for reading from `handle`.
///
/// # Errors
///
/// - [`Error::ConstraintViolation`] if `constraints` do not satisfy the
///   required input constraints
/// - [`Error::InvalidStrategy`] if the handle cannot read
/// - [`Error::Unsupported`] if another buffer already views the mapping
pub fn allocate_ibuffer<'h>(handle: &'h Handle, constraints: &ConstraintSet) -> Result<Buffer<'h>> {
    if !handle.mode().has_read_access() {
        return Err(Error::InvalidStrategy("handle is not open for reading"));
    }
    allocate(handle, Direction::Input, handle.strategy().read_method(), constraints)
}

/// Buffer for writing to `handle`.
pub fn allocate_obuffer<'h>(handle: &'h Handle, constraints: &ConstraintSet) -> Result<Buffer<'h>> {
    if !handle.mode().has_write_access() {
        return Err(Error::InvalidStrategy("handle is not open for writing"));
    }
    allocate(handle, Direction::Output, handle.strategy().write_method(), constraints)
}

/// Single buffer serving both directions of a read-write handle.
///
/// # Errors
///
/// Returns [`Error::FusedBufferNotAllowed`] if exactly one direction is
/// mapped.
pub fn allocate_iobuffer<'h>(handle: &'h Handle, constraints: &ConstraintSet) -> Result<Buffer<'h>> {
    if handle.mode().direction() != Direction::Both {
        return Err(Error::InvalidStrategy("handle is not open for reading and writing"));
    }
    let strategy = handle.strategy();
    if !strategy.supports_fused_buffers() {
        return Err(Error::FusedBufferNotAllowed);
    }
    allocate(handle, Direction::Both, strategy.method(Direction::Both), constraints)
}

pub fn preferred_ibuffer(handle: &Handle) -> Result<Buffer<'_>> {
    let preferred = handle.strategy().constraints(Direction::Input).preferred;
    allocate_ibuffer(handle, &preferred)
}

pub fn preferred_obuffer(handle: &Handle) -> Result<Buffer<'_>> {
    let preferred = handle.strategy().constraints(Direction::Output).preferred;
    allocate_obuffer(handle, &preferred)
}

pub fn preferred_iobuffer(handle: &Handle) -> Result<Buffer<'_>> {
    let preferred = handle.strategy().constraints(Direction::Both).preferred;
    allocate_iobuffer(handle, &preferred)
}

fn allocate<'h>(
    handle: &'h Handle,
    direction: Direction,
    method: Option<IoMethod>,
    constraints: &ConstraintSet,
) -> Result<Buffer<'h>> {
    let required = &handle.strategy().constraints(direction).required;
    if !constraints.satisfies(required) {
        return Err(Error::ConstraintViolation(
            "buffer constraints do not satisfy the strategy's required set",
        ));
    }
    if method == Some(IoMethod::Mapped) {
        let mapping = handle
            .mapping()
            .ok_or(Error::InvalidStrategy("mapped mechanism without a mapping"))?;
        return Buffer::mapped(mapping);
    }
    Buffer::allocate(constraints)
}
