//! Self-describing binary archives of fixed-shape numeric records.
//!
//! An archive is a header describing one element type (a tuple of scalars,
//! vectors and matrices), the byte order of its integers and floats, and an
//! element count, followed by fixed-size element records.
//!
//! The codec functions ([`write_header`], [`read_header`], [`serialize`],
//! [`deserialize`]) work on plain byte slices and report through an
//! [`OperationStatus`](crate::diagnostics::OperationStatus) plus a
//! [`Diagnostics`](crate::diagnostics::Diagnostics) log. [`ArchiveWriter`]
//! and [`ArchiveReader`] run them over a [`Handle`](crate::file::Handle).

pub mod codec;
pub mod header;
pub mod scalar;
pub mod schema;
pub mod state;
pub mod stream;
pub mod value;

pub use codec::{deserialize, serialize};
pub use header::{
    finalize_header, inspect_header, read_header, write_header, write_header_with_order, HeaderInfo, VERSION,
};
pub use scalar::{ByteOrder, Scalar, ScalarType};
pub use schema::{Component, Schema, StorageOrder};
pub use state::{IoState, StreamPhase};
pub use stream::{read_header_info, ArchiveReader, ArchiveWriter};
pub use value::{Data, Matrix, ScalarValue, Value};
