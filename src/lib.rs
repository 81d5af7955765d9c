//! Platform-adaptive file I/O and a self-describing tensor archive format.
//!
//! The crate has three layers:
//!
//! - [`constraints`]: size and alignment requirements for transfer buffers
//!   and the algebra for combining them.
//! - [`strategy`] and [`file`]: per-file selection of paged, direct or
//!   mapped I/O, and the handles, buffers and positioned transfers that
//!   carry the choice out.
//! - [`archive`]: the binary codec for records of scalars, vectors and
//!   matrices, with byte-order and storage-order normalisation.
//!
//! Format problems are reported through [`diagnostics`]; system failures
//! surface as [`Error::Io`].

pub mod archive;
pub mod constraints;
pub mod diagnostics;
pub mod error;
pub mod file;
pub mod strategy;

pub use constraints::ConstraintSet;
pub use diagnostics::{Diagnostics, OperationStatus, Severity};
pub use error::{Error, Result};
pub use file::{Buffer, Handle};
pub use strategy::{AccessPattern, IoMethod, IoStrategy, KernelProfile, OpenMode, StrategyConfig};
