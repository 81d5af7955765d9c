//! Element serialization and deserialization.
//!
//! An element record is the concatenation of its components in schema order.
//! Matrices are written in their declared storage order and integers and
//! floats in the byte order chosen when the header was written or read.

use crate::archive::scalar::{Scalar, Swap};
use crate::archive::schema::{Component, StorageOrder};
use crate::archive::state::{IoState, StreamPhase};
use crate::archive::value::{with_data, Data, Matrix, ScalarValue, Value};
use crate::diagnostics::{Context, Diagnostics, OperationStatus};

/// Encodes `element` into the front of `buf`.
///
/// Every value is checked against its schema component before anything is
/// written. A matrix whose storage order differs from the declared one is
/// transposed while it is copied.
pub fn serialize(element: &[Value], buf: &mut [u8], state: &mut IoState, diags: &mut Diagnostics) -> OperationStatus {
    let index = state.elements_processed();
    if state.phase() != StreamPhase::HeaderWritten {
        diags.critical(Context::new(index, 0), "element written outside an open stream");
        return OperationStatus::fatal_failure();
    }
    let element_size = state.element_size();
    if buf.len() < element_size {
        state.set_consumed(0);
        return OperationStatus::INCOMPLETE;
    }
    if element.len() != state.schema().len() {
        diags.critical(Context::new(index, 0), "mismatching component extents");
        return OperationStatus::fatal_failure();
    }

    let mut valid = true;
    for (i, (value, component)) in element.iter().zip(state.schema().components()).enumerate() {
        if !value.matches(component) {
            diags.critical(
                Context::new(index, i as u8),
                format!("value does not match component {component}"),
            );
            valid = false;
        }
    }
    if !valid {
        state.set_consumed(0);
        return OperationStatus::fatal_failure();
    }

    let swap = state.swap();
    let out = &mut buf[..element_size];
    let offsets = state.schema().component_offsets();
    for ((value, component), offset) in element.iter().zip(state.schema().components()).zip(offsets) {
        let out = &mut out[offset..offset + component.byte_size()];
        let flip = swap.applies_to(component.scalar_type());
        match (value, component) {
            (Value::Scalar(v), _) => v.encode(out, flip),
            (Value::Vector(data), _) => data.encode(out, flip),
            (Value::Matrix(m), Component::Matrix { order, .. }) if m.order() != *order => {
                with_data!(m.data(), v => encode_transposed(v, m.rows(), m.cols(), m.order(), out, flip))
            }
            (Value::Matrix(m), _) => m.data().encode(out, flip),
        }
    }

    state.set_consumed(element_size);
    state.record_written();
    OperationStatus::SUCCESS
}

/// Decodes one element from the front of `buf` into [`IoState::element`].
///
/// Allocations from the previous element are reused. Matrices keep the
/// stream's storage order unless [`IoState::set_materialize`] asked for the
/// schema's order.
pub fn deserialize(buf: &[u8], state: &mut IoState, diags: &mut Diagnostics) -> OperationStatus {
    let index = state.elements_processed();
    if state.phase() != StreamPhase::HeaderRead {
        diags.critical(Context::new(index, 0), "element read before a verified header");
        return OperationStatus::fatal_failure();
    }
    let element_size = state.element_size();
    if buf.len() < element_size {
        state.set_consumed(0);
        return OperationStatus::INCOMPLETE;
    }

    let swap = state.swap();
    let materialize = state.materialize();
    let mut element = std::mem::take(state.element_mut());
    element.truncate(state.schema().len());

    let offsets: Vec<usize> = state.schema().component_offsets().collect();
    for (i, offset) in offsets.into_iter().enumerate() {
        let Some(stream) = state.stream_component(i) else {
            continue;
        };
        let bytes = &buf[offset..offset + stream.byte_size()];
        let declared = state.schema().components()[i];
        let slot = element.get_mut(i);
        let value = decode_component(stream, declared, bytes, swap, materialize, slot);
        if let Some(value) = value {
            element.push(value);
        }
    }

    *state.element_mut() = element;
    state.set_consumed(element_size);
    state.record_read();
    OperationStatus::SUCCESS
}

/// Decodes into `slot` when it already holds a value of the right kind, or
/// returns a fresh value to append.
fn decode_component(
    stream: Component,
    declared: Component,
    bytes: &[u8],
    swap: Swap,
    materialize: bool,
    slot: Option<&mut Value>,
) -> Option<Value> {
    let ty = stream.scalar_type();
    let flip = swap.applies_to(ty);
    match stream {
        Component::Scalar(_) => {
            let v = Value::Scalar(ScalarValue::decode(ty, bytes, flip));
            match slot {
                Some(slot) => {
                    *slot = v;
                    None
                }
                None => Some(v),
            }
        }
        Component::Vector { len, .. } => match slot {
            Some(Value::Vector(data)) => {
                data.decode_into(ty, bytes, len as usize, flip);
                None
            }
            Some(slot) => {
                *slot = Value::Vector(Data::decode(ty, bytes, len as usize, flip));
                None
            }
            None => Some(Value::Vector(Data::decode(ty, bytes, len as usize, flip))),
        },
        Component::Matrix { rows, cols, order, .. } => {
            let (rows, cols) = (rows as usize, cols as usize);
            let target = match declared {
                Component::Matrix { order: wanted, .. } if materialize => wanted,
                _ => order,
            };
            match slot {
                Some(Value::Matrix(m)) => {
                    m.data_mut().decode_into(ty, bytes, rows * cols, flip);
                    m.set_layout(rows, cols, order);
                    if target != order {
                        *m = m.to_order(target);
                    }
                    None
                }
                other => {
                    let data = Data::decode(ty, bytes, rows * cols, flip);
                    let mut m = Matrix::from_parts(rows, cols, order, data);
                    if target != order {
                        m = m.to_order(target);
                    }
                    match other {
                        Some(slot) => {
                            *slot = Value::Matrix(m);
                            None
                        }
                        None => Some(Value::Matrix(m)),
                    }
                }
            }
        }
    }
}

/// Writes `src`, stored in `from` order, to `out` in the opposite order.
/// Destination positions are visited front to back.
fn encode_transposed<T: Scalar>(src: &[T], rows: usize, cols: usize, from: StorageOrder, out: &mut [u8], swap: bool) {
    let width = T::TYPE.width();
    let mut chunks = out.chunks_exact_mut(width);
    match from {
        StorageOrder::RowMajor => {
            for c in 0..cols {
                for r in 0..rows {
                    if let Some(chunk) = chunks.next() {
                        src[r * cols + c].encode(chunk, swap);
                    }
                }
            }
        }
        StorageOrder::ColumnMajor => {
            for r in 0..rows {
                for c in 0..cols {
                    if let Some(chunk) = chunks.next() {
                        src[c * rows + r].encode(chunk, swap);
                    }
                }
            }
        }
    }
}
