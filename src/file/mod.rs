//! File access: handles, buffers and positioned transfers.
//!
//! A [`Handle`] opens a file the way its [`crate::strategy::IoStrategy`]
//! prescribes, including an optional memory mapping. Buffers come from the
//! `allocate_*` functions and either own heap memory or alias the handle's
//! mapping. [`transfer::read`] and [`transfer::write`] move bytes between the
//! two.

pub mod allocate;
pub mod buffer;
pub mod handle;
pub mod sys;
pub mod transfer;

pub use allocate::{
    allocate_ibuffer, allocate_iobuffer, allocate_obuffer, preferred_ibuffer, preferred_iobuffer,
    preferred_obuffer,
};
pub use buffer::{Buffer, BufferSource};
pub use handle::{Handle, MapAccess};
pub use transfer::{read, write};
