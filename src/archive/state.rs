//! Per-stream codec state.

use crate::archive::scalar::{ByteOrder, Swap};
use crate::archive::schema::{Component, Schema};
use crate::archive::value::Value;
use crate::constraints::ConstraintSet;

/// Position of a stream in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamPhase {
    Unopened,
    HeaderRead,
    HeaderWritten,
    Finalized,
}

/// Codec state for one logical archive stream.
///
/// Header reads and writes fill in the byte order, swap flags and transpose
/// flags; every element step consults them.
#[derive(Debug, Clone)]
pub struct IoState {
    schema: Schema,
    byte_order: ByteOrder,
    swap: Swap,
    transpose: Vec<bool>,
    element_count: u64,
    count_overridden: bool,
    elements_processed: u64,
    consumed: usize,
    phase: StreamPhase,
    element: Vec<Value>,
    materialize: bool,
}

impl IoState {
    pub fn new(schema: Schema) -> Self {
        let transpose = vec![false; schema.len()];
        Self {
            schema,
            byte_order: ByteOrder::native(),
            swap: Swap::default(),
            transpose,
            element_count: 0,
            count_overridden: false,
            elements_processed: 0,
            consumed: 0,
            phase: StreamPhase::Unopened,
            element: Vec::new(),
            materialize: false,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn header_size(&self) -> usize {
        self.schema.header_size()
    }

    pub fn element_size(&self) -> usize {
        self.schema.element_size()
    }

    /// Element count read from the header, or the count that
    /// [`finalize_header`](crate::archive::finalize_header) will write.
    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    /// Overrides the count written when the header is finalized.
    pub fn set_element_count(&mut self, count: u64) {
        self.element_count = count;
        self.count_overridden = true;
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn flip_integers(&self) -> bool {
        self.swap.integers
    }

    pub fn flip_floats(&self) -> bool {
        self.swap.floats
    }

    pub fn swap(&self) -> Swap {
        self.swap
    }

    /// True if the stream stores matrix `component` in the opposite order to
    /// the schema.
    pub fn is_transposed(&self, component: usize) -> bool {
        self.transpose.get(component).copied().unwrap_or(false)
    }

    /// Bytes consumed by the last header or element step.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Most recently decoded element.
    pub fn element(&self) -> &[Value] {
        &self.element
    }

    /// Moves the decoded element out; the next decode allocates afresh.
    pub fn take_element(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.element)
    }

    /// When set, decoded matrices are rearranged into the schema's order
    /// instead of keeping the stream's order.
    pub fn set_materialize(&mut self, materialize: bool) {
        self.materialize = materialize;
    }

    pub fn materialize(&self) -> bool {
        self.materialize
    }

    pub fn elements_processed(&self) -> u64 {
        self.elements_processed
    }

    /// Smallest buffer able to hold the header or one element.
    pub fn buffer_constraints(&self) -> ConstraintSet {
        let size = self.header_size().max(self.element_size());
        ConstraintSet::new().with_at_least(size).unwrap_or_default()
    }

    pub(crate) fn set_byte_order(&mut self, order: ByteOrder) {
        self.byte_order = order;
        self.swap = order.swaps();
    }

    pub(crate) fn set_transposed(&mut self, component: usize, transposed: bool) {
        if let Some(flag) = self.transpose.get_mut(component) {
            *flag = transposed;
        }
    }

    pub(crate) fn set_consumed(&mut self, consumed: usize) {
        self.consumed = consumed;
    }

    pub(crate) fn set_phase(&mut self, phase: StreamPhase) {
        self.phase = phase;
    }

    pub(crate) fn set_header_count(&mut self, count: u64) {
        self.element_count = count;
    }

    pub(crate) fn count_overridden(&self) -> bool {
        self.count_overridden
    }

    /// Records one more serialized element.
    pub(crate) fn record_written(&mut self) {
        self.elements_processed += 1;
        if !self.count_overridden {
            self.element_count = self.element_count.max(self.elements_processed);
        }
    }

    pub(crate) fn record_read(&mut self) {
        self.elements_processed += 1;
    }

    pub(crate) fn element_mut(&mut self) -> &mut Vec<Value> {
        &mut self.element
    }

    /// Storage order the stream uses for matrix `component`.
    pub(crate) fn stream_component(&self, index: usize) -> Option<Component> {
        let component = *self.schema.components().get(index)?;
        Some(match component {
            Component::Matrix {
                scalar,
                rows,
                cols,
                order,
            } if self.is_transposed(index) => Component::Matrix {
                scalar,
                rows,
                cols,
                order: order.opposite(),
            },
            other => other,
        })
    }
}
