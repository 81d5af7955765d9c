//! Archive header construction and verification.
//!
//! Layout, all multi-byte fields in the declared integer byte order:
//!
//! ```text
//! [0]      version
//! [1]      byte-order flags (0x01 integers big-endian, 0x10 floats big-endian)
//! [2]      component count
//! [3..]    component descriptors
//!            scalar  [code][0]
//!            vector  [code][1][len:u32]
//!            matrix  [code][2][order][rows:u32][cols:u32]
//! [..+8]   element count (u64)
//! ```

use crate::archive::scalar::{ByteOrder, Scalar, ScalarType};
use crate::archive::schema::{Component, Schema, StorageOrder, COUNT_SIZE, PREAMBLE_SIZE};
use crate::archive::state::{IoState, StreamPhase};
use crate::diagnostics::{Context, Diagnostics, OperationStatus, Severity};
use crate::{Error, Result};

/// Newest format version this crate reads and the one it writes.
pub const VERSION: u8 = 1;

/// Writes a header in the host byte order.
///
/// The trailing count holds the state's current element count; patch it
/// with [`finalize_header`] once all elements are written.
pub fn write_header(buf: &mut [u8], state: &mut IoState, diags: &mut Diagnostics) -> OperationStatus {
    write_header_with_order(buf, state, diags, ByteOrder::native())
}

/// Writes a header declaring `order`. Subsequent [`serialize`] calls emit
/// elements in that order.
///
/// [`serialize`]: crate::archive::serialize
pub fn write_header_with_order(
    buf: &mut [u8],
    state: &mut IoState,
    diags: &mut Diagnostics,
    order: ByteOrder,
) -> OperationStatus {
    if state.phase() != StreamPhase::Unopened {
        return out_of_order(diags, "header written twice");
    }
    let header_size = state.header_size();
    if buf.len() < header_size {
        state.set_consumed(0);
        return OperationStatus::INCOMPLETE;
    }
    state.set_byte_order(order);
    let swap = state.flip_integers();

    let out = &mut buf[..header_size];
    out[0] = VERSION;
    out[1] = order.flags();
    // Schema::new caps the component count at 255.
    out[2] = state.schema().len() as u8;
    let mut pos = PREAMBLE_SIZE;
    for component in state.schema().components() {
        out[pos] = component.scalar_type().code();
        out[pos + 1] = component.dimension();
        match *component {
            Component::Scalar(_) => {}
            Component::Vector { len, .. } => len.encode(&mut out[pos + 2..], swap),
            Component::Matrix {
                rows,
                cols,
                order: storage,
                ..
            } => {
                out[pos + 2] = storage as u8;
                rows.encode(&mut out[pos + 3..], swap);
                cols.encode(&mut out[pos + 7..], swap);
            }
        }
        pos += component.descriptor_size();
    }
    state.element_count().encode(&mut out[pos..], swap);

    state.set_consumed(header_size);
    state.set_phase(StreamPhase::HeaderWritten);
    OperationStatus::SUCCESS
}

/// Verifies a header against the state's schema.
///
/// Sets the stream's swap flags from the declared byte order and marks every
/// matrix whose declared storage order differs from the schema's as
/// transposed. Shape mismatches are recorded as critical diagnostics; the
/// outcome is `FAILURE | FATAL` if any were recorded.
pub fn read_header(buf: &[u8], state: &mut IoState, diags: &mut Diagnostics) -> OperationStatus {
    if state.phase() != StreamPhase::Unopened {
        return out_of_order(diags, "header read twice");
    }
    let header_size = state.header_size();
    if buf.len() < header_size {
        state.set_consumed(0);
        return OperationStatus::INCOMPLETE;
    }
    state.set_consumed(header_size);
    let buf = &buf[..header_size];
    let criticals = diags.count(Severity::Critical);

    if buf[0] > VERSION {
        diags.critical(Context::new(0, 0), "unsupported archive version");
        return OperationStatus::fatal_failure();
    }

    state.set_byte_order(ByteOrder::from_flags(buf[1]));
    let swap = state.flip_integers();

    if usize::from(buf[2]) != state.schema().len() {
        diags.critical(Context::new(0, 0), "mismatching component extents");
        return OperationStatus::fatal_failure();
    }

    let components = state.schema().components().to_vec();
    let mut pos = PREAMBLE_SIZE;
    for (index, expected) in components.iter().enumerate() {
        let ctx = Context::new(0, index as u8);
        let desc = &buf[pos..pos + expected.descriptor_size()];
        if desc[0] != expected.scalar_type().code() {
            diags.critical(ctx, "mismatching scalar types");
        }
        if desc[1] != expected.dimension() {
            diags.critical(ctx, "mismatching dimensions");
        }
        match *expected {
            Component::Scalar(_) => {}
            Component::Vector { len, .. } => {
                if u32::decode(&desc[2..], swap) != len {
                    diags.critical(ctx, "mismatching vector sizes");
                }
            }
            Component::Matrix { rows, cols, order, .. } => {
                match StorageOrder::from_byte(desc[2]) {
                    Some(declared) => state.set_transposed(index, declared != order),
                    None => diags.critical(ctx, "invalid storage order"),
                }
                if u32::decode(&desc[3..], swap) != rows {
                    diags.critical(ctx, "mismatching row count");
                }
                if u32::decode(&desc[7..], swap) != cols {
                    diags.critical(ctx, "mismatching column count");
                }
            }
        }
        pos += expected.descriptor_size();
    }

    state.set_header_count(u64::decode(&buf[header_size - COUNT_SIZE..], swap));

    if diags.count(Severity::Critical) > criticals {
        return OperationStatus::fatal_failure();
    }
    state.set_phase(StreamPhase::HeaderRead);
    OperationStatus::SUCCESS
}

/// Patches the element count into a header previously produced by
/// [`write_header`] and closes the stream.
pub fn finalize_header(buf: &mut [u8], state: &mut IoState, diags: &mut Diagnostics) -> OperationStatus {
    if state.phase() != StreamPhase::HeaderWritten {
        return out_of_order(diags, "finalize without a written header");
    }
    let header_size = state.header_size();
    if buf.len() < header_size {
        state.set_consumed(0);
        return OperationStatus::INCOMPLETE;
    }
    let count = state.element_count();
    count.encode(&mut buf[header_size - COUNT_SIZE..header_size], state.flip_integers());
    log::debug!(
        "finalized archive header: {} elements ({} written)",
        count,
        state.elements_processed()
    );
    state.set_consumed(header_size);
    state.set_phase(StreamPhase::Finalized);
    OperationStatus::SUCCESS
}

fn out_of_order(diags: &mut Diagnostics, message: &'static str) -> OperationStatus {
    diags.critical(Context::new(0, 0), message);
    OperationStatus::fatal_failure()
}

/// A header parsed without an expected schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub version: u8,
    pub byte_order: ByteOrder,
    pub schema: Schema,
    pub element_count: u64,
}

impl HeaderInfo {
    pub fn header_size(&self) -> usize {
        self.schema.header_size()
    }

    /// Bytes the header and every declared element occupy, or `None` if the
    /// declared count does not fit in a `u64` file size.
    pub fn data_size(&self) -> Option<u64> {
        self.element_count
            .checked_mul(self.schema.element_size() as u64)?
            .checked_add(self.header_size() as u64)
    }
}

/// Parses the header at the start of `buf`, describing whatever it declares.
///
/// # Errors
///
/// Returns [`Error::Format`] if the header is truncated, from a newer
/// version, or contains an unknown code, and [`Error::InvalidSchema`] if the
/// declared layout is degenerate.
pub fn inspect_header(buf: &[u8]) -> Result<HeaderInfo> {
    let truncated = || Error::Format("unexpected end of header".into());
    if buf.len() < PREAMBLE_SIZE {
        return Err(truncated());
    }
    let version = buf[0];
    if version > VERSION {
        return Err(Error::Format(format!("unsupported archive version {version}")));
    }
    let byte_order = ByteOrder::from_flags(buf[1]);
    let swap = byte_order.swaps().integers;
    let count = usize::from(buf[2]);

    let mut components = Vec::with_capacity(count);
    let mut pos = PREAMBLE_SIZE;
    for index in 0..count {
        let head = buf.get(pos..pos + 2).ok_or_else(truncated)?;
        let scalar = ScalarType::from_code(head[0])
            .ok_or_else(|| Error::Format(format!("component {index}: unknown scalar code {}", head[0])))?;
        let component = match head[1] {
            0 => Component::Scalar(scalar),
            1 => {
                let desc = buf.get(pos..pos + 6).ok_or_else(truncated)?;
                Component::Vector {
                    scalar,
                    len: u32::decode(&desc[2..], swap),
                }
            }
            2 => {
                let desc = buf.get(pos..pos + 11).ok_or_else(truncated)?;
                let order = StorageOrder::from_byte(desc[2])
                    .ok_or_else(|| Error::Format(format!("component {index}: invalid storage order")))?;
                Component::Matrix {
                    scalar,
                    rows: u32::decode(&desc[3..], swap),
                    cols: u32::decode(&desc[7..], swap),
                    order,
                }
            }
            dim => return Err(Error::Format(format!("component {index}: invalid dimension {dim}"))),
        };
        pos += component.descriptor_size();
        components.push(component);
    }

    let count_bytes = buf.get(pos..pos + COUNT_SIZE).ok_or_else(truncated)?;
    let element_count = u64::decode(count_bytes, swap);
    Ok(HeaderInfo {
        version,
        byte_order,
        schema: Schema::new(components)?,
        element_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Component::Scalar(ScalarType::F64),
            Component::Vector {
                scalar: ScalarType::F64,
                len: 10,
            },
            Component::Matrix {
                scalar: ScalarType::F64,
                rows: 10,
                cols: 10,
                order: StorageOrder::RowMajor,
            },
        ])
        .expect("valid schema")
    }

    fn written(order: ByteOrder, count: u64) -> Vec<u8> {
        let mut state = IoState::new(schema());
        let mut diags = Diagnostics::new();
        let mut buf = vec![0u8; state.header_size()];
        state.set_element_count(count);
        assert!(write_header_with_order(&mut buf, &mut state, &mut diags, order).is_success());
        buf
    }

    #[test]
    fn header_layout_is_byte_exact() {
        let buf = written(ByteOrder::LITTLE, 5);
        assert_eq!(buf.len(), 30);
        assert_eq!(&buf[..3], &[VERSION, 0x00, 3]);
        assert_eq!(&buf[3..5], &[9, 0]);
        assert_eq!(&buf[5..11], &[9, 1, 10, 0, 0, 0]);
        assert_eq!(&buf[11..22], &[9, 2, 0, 10, 0, 0, 0, 10, 0, 0, 0]);
        assert_eq!(&buf[22..], &5u64.to_le_bytes());

        let big = written(ByteOrder::BIG, 5);
        assert_eq!(big[1], 0x11);
        assert_eq!(&big[7..11], &[0, 0, 0, 10]);
        assert_eq!(&big[22..], &5u64.to_be_bytes());
    }

    #[test]
    fn read_back_in_either_byte_order() {
        for order in [ByteOrder::native(), ByteOrder::foreign()] {
            let buf = written(order, 1234);
            let mut state = IoState::new(schema());
            let mut diags = Diagnostics::new();
            let status = read_header(&buf, &mut state, &mut diags);
            assert_eq!(status, OperationStatus::SUCCESS, "{diags:?}");
            assert_eq!(state.element_count(), 1234);
            assert_eq!(state.byte_order(), order);
            assert_eq!(state.flip_integers(), order != ByteOrder::native());
            assert_eq!(state.consumed(), 30);
            assert_eq!(state.phase(), StreamPhase::HeaderRead);
        }
    }

    #[test]
    fn short_buffer_is_incomplete() {
        let buf = written(ByteOrder::native(), 0);
        let mut state = IoState::new(schema());
        let mut diags = Diagnostics::new();
        let status = read_header(&buf[..20], &mut state, &mut diags);
        assert!(status.is_incomplete());
        assert_eq!(state.consumed(), 0);
        assert!(diags.is_empty());
    }

    #[test]
    fn newer_version_is_fatal() {
        let mut buf = written(ByteOrder::native(), 0);
        buf[0] = VERSION + 1;
        let mut state = IoState::new(schema());
        let mut diags = Diagnostics::new();
        assert_eq!(read_header(&buf, &mut state, &mut diags), OperationStatus::fatal_failure());
        assert_eq!(
            diags.last_critical().map(|r| r.message.as_str()),
            Some("unsupported archive version")
        );
        assert!(inspect_header(&buf).is_err());
    }

    #[test]
    fn shape_mismatches_are_critical() {
        let mut buf = written(ByteOrder::native(), 0);
        11u32.encode(&mut buf[5 + 2..], false);
        buf[11] = ScalarType::F32.code();
        let mut state = IoState::new(schema());
        let mut diags = Diagnostics::new();
        let status = read_header(&buf, &mut state, &mut diags);
        assert_eq!(status, OperationStatus::fatal_failure());
        let messages: Vec<_> = diags.iter().map(|r| (r.context, r.message.as_str())).collect();
        assert_eq!(
            messages,
            vec![
                (Some(Context::new(0, 1)), "mismatching vector sizes"),
                (Some(Context::new(0, 2)), "mismatching scalar types"),
            ]
        );
        assert_eq!(state.phase(), StreamPhase::Unopened);
    }

    #[test]
    fn component_count_mismatch_is_fatal() {
        let mut buf = written(ByteOrder::native(), 0);
        buf[2] = 2;
        let mut state = IoState::new(schema());
        let mut diags = Diagnostics::new();
        assert_eq!(read_header(&buf, &mut state, &mut diags), OperationStatus::fatal_failure());
        assert_eq!(diags.count(Severity::Critical), 1);
        assert_eq!(
            diags.last_critical().map(|r| r.message.as_str()),
            Some("mismatching component extents")
        );
    }

    #[test]
    fn opposite_storage_order_sets_transpose_flag() {
        let buf = written(ByteOrder::native(), 0);
        let mut state = IoState::new(schema().transposed_storage());
        let mut diags = Diagnostics::new();
        assert!(read_header(&buf, &mut state, &mut diags).is_success());
        assert!(state.is_transposed(2));
        assert!(!state.is_transposed(1));
        assert!(diags.is_empty());
    }

    #[test]
    fn finalize_patches_count() {
        let mut state = IoState::new(schema());
        let mut diags = Diagnostics::new();
        let mut buf = vec![0u8; 30];
        assert!(write_header(&mut buf, &mut state, &mut diags).is_success());
        state.set_element_count(77);
        assert!(finalize_header(&mut buf, &mut state, &mut diags).is_success());
        assert_eq!(state.phase(), StreamPhase::Finalized);

        let info = inspect_header(&buf).expect("valid header");
        assert_eq!(info.element_count, 77);
        assert_eq!(info.schema, schema());
        assert_eq!(info.byte_order, ByteOrder::native());
        assert_eq!(info.header_size(), 30);

        let status = finalize_header(&mut buf, &mut state, &mut diags);
        assert!(status.is_fatal());
    }

    #[test]
    fn inspect_rejects_truncated_headers() {
        let buf = written(ByteOrder::native(), 3);
        for len in [0, 2, 10, 29] {
            assert!(matches!(inspect_header(&buf[..len]), Err(Error::Format(_))), "len {len}");
        }
    }

    #[test]
    fn data_size_reports_overflowing_counts() {
        let info = inspect_header(&written(ByteOrder::native(), 4)).expect("inspect");
        assert_eq!(info.data_size(), Some(30 + 4 * 888));

        let huge = inspect_header(&written(ByteOrder::native(), u64::MAX / 2)).expect("inspect");
        assert_eq!(huge.element_count, u64::MAX / 2);
        assert_eq!(huge.data_size(), None);
    }

    #[test]
    fn inspect_rejects_oversized_extents() {
        let mut buf = written(ByteOrder::native(), 1);
        // Third component is the matrix descriptor at 3 + 2 + 6.
        u32::MAX.encode(&mut buf[11 + 3..], false);
        u32::MAX.encode(&mut buf[11 + 7..], false);
        assert!(matches!(inspect_header(&buf), Err(Error::InvalidSchema(_))));
    }
}
