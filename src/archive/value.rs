//! In-memory element values.
//!
//! An element is a `Vec<Value>` with one entry per schema component. Vector
//! and matrix payloads are owned, typed arrays ([`Data`]). A [`Matrix`]
//! remembers the storage order of its array and answers logical
//! `(row, col)` queries through the matching index mapping, so a transposed
//! layout never has to be rearranged in memory.

use std::fmt;

use crate::archive::scalar::{Scalar, ScalarType};
use crate::archive::schema::{Component, StorageOrder};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Runs `$body` with `$v` bound to the typed vector inside a [`Data`].
macro_rules! with_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            Data::I8($v) => $body,
            Data::I16($v) => $body,
            Data::I32($v) => $body,
            Data::I64($v) => $body,
            Data::U8($v) => $body,
            Data::U16($v) => $body,
            Data::U32($v) => $body,
            Data::U64($v) => $body,
            Data::F32($v) => $body,
            Data::F64($v) => $body,
        }
    };
}

/// Runs `$body` with `$t` bound to the Rust type matching a [`ScalarType`].
macro_rules! with_scalar_type {
    ($ty:expr, $t:ident => $body:expr) => {
        match $ty {
            ScalarType::I8 => {
                type $t = i8;
                $body
            }
            ScalarType::I16 => {
                type $t = i16;
                $body
            }
            ScalarType::I32 => {
                type $t = i32;
                $body
            }
            ScalarType::I64 => {
                type $t = i64;
                $body
            }
            ScalarType::U8 => {
                type $t = u8;
                $body
            }
            ScalarType::U16 => {
                type $t = u16;
                $body
            }
            ScalarType::U32 => {
                type $t = u32;
                $body
            }
            ScalarType::U64 => {
                type $t = u64;
                $body
            }
            ScalarType::F32 => {
                type $t = f32;
                $body
            }
            ScalarType::F64 => {
                type $t = f64;
                $body
            }
        }
    };
}

pub(crate) use with_data;

impl ScalarValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::I8(_) => ScalarType::I8,
            ScalarValue::I16(_) => ScalarType::I16,
            ScalarValue::I32(_) => ScalarType::I32,
            ScalarValue::I64(_) => ScalarType::I64,
            ScalarValue::U8(_) => ScalarType::U8,
            ScalarValue::U16(_) => ScalarType::U16,
            ScalarValue::U32(_) => ScalarType::U32,
            ScalarValue::U64(_) => ScalarType::U64,
            ScalarValue::F32(_) => ScalarType::F32,
            ScalarValue::F64(_) => ScalarType::F64,
        }
    }

    pub fn get<T: Scalar>(self) -> Option<T> {
        T::from_value(self)
    }

    pub(crate) fn encode(self, out: &mut [u8], swap: bool) {
        match self {
            ScalarValue::I8(v) => v.encode(out, swap),
            ScalarValue::I16(v) => v.encode(out, swap),
            ScalarValue::I32(v) => v.encode(out, swap),
            ScalarValue::I64(v) => v.encode(out, swap),
            ScalarValue::U8(v) => v.encode(out, swap),
            ScalarValue::U16(v) => v.encode(out, swap),
            ScalarValue::U32(v) => v.encode(out, swap),
            ScalarValue::U64(v) => v.encode(out, swap),
            ScalarValue::F32(v) => v.encode(out, swap),
            ScalarValue::F64(v) => v.encode(out, swap),
        }
    }

    pub(crate) fn decode(ty: ScalarType, bytes: &[u8], swap: bool) -> Self {
        with_scalar_type!(ty, T => T::decode(bytes, swap).into_value())
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::I8(v) => write!(f, "{v}"),
            ScalarValue::I16(v) => write!(f, "{v}"),
            ScalarValue::I32(v) => write!(f, "{v}"),
            ScalarValue::I64(v) => write!(f, "{v}"),
            ScalarValue::U8(v) => write!(f, "{v}"),
            ScalarValue::U16(v) => write!(f, "{v}"),
            ScalarValue::U32(v) => write!(f, "{v}"),
            ScalarValue::U64(v) => write!(f, "{v}"),
            ScalarValue::F32(v) => write!(f, "{v}"),
            ScalarValue::F64(v) => write!(f, "{v}"),
        }
    }
}

impl Data {
    pub fn new<T: Scalar>(values: Vec<T>) -> Self {
        T::into_data(values)
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Data::I8(_) => ScalarType::I8,
            Data::I16(_) => ScalarType::I16,
            Data::I32(_) => ScalarType::I32,
            Data::I64(_) => ScalarType::I64,
            Data::U8(_) => ScalarType::U8,
            Data::U16(_) => ScalarType::U16,
            Data::U32(_) => ScalarType::U32,
            Data::U64(_) => ScalarType::U64,
            Data::F32(_) => ScalarType::F32,
            Data::F64(_) => ScalarType::F64,
        }
    }

    pub fn len(&self) -> usize {
        with_data!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice<T: Scalar>(&self) -> Option<&[T]> {
        T::slice(self)
    }

    pub fn get(&self, index: usize) -> Option<ScalarValue> {
        with_data!(self, v => v.get(index).map(|x| x.into_value()))
    }

    /// Encodes every value back to back into `out`.
    pub(crate) fn encode(&self, out: &mut [u8], swap: bool) {
        with_data!(self, v => encode_slice(v, out, swap))
    }

    /// Decodes `count` values of type `ty`, reusing the allocation when the
    /// current variant already has that type.
    pub(crate) fn decode_into(&mut self, ty: ScalarType, bytes: &[u8], count: usize, swap: bool) {
        with_scalar_type!(ty, T => {
            let previous = std::mem::replace(self, Data::U8(Vec::new()));
            let mut values: Vec<T> = T::take_vec(previous).unwrap_or_default();
            decode_slice(&mut values, bytes, count, swap);
            *self = T::into_data(values);
        })
    }

    /// Decodes `count` values of type `ty` into a fresh array.
    pub(crate) fn decode(ty: ScalarType, bytes: &[u8], count: usize, swap: bool) -> Self {
        with_scalar_type!(ty, T => {
            let mut values: Vec<T> = Vec::with_capacity(count);
            decode_slice(&mut values, bytes, count, swap);
            T::into_data(values)
        })
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        with_data!(self, v => write_list(f, v.iter()))
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = T>) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]")
}

pub(crate) fn encode_slice<T: Scalar>(values: &[T], out: &mut [u8], swap: bool) {
    let width = T::TYPE.width();
    for (value, chunk) in values.iter().zip(out.chunks_exact_mut(width)) {
        value.encode(chunk, swap);
    }
}

fn decode_slice<T: Scalar>(values: &mut Vec<T>, bytes: &[u8], count: usize, swap: bool) {
    let width = T::TYPE.width();
    values.clear();
    values.extend(bytes.chunks_exact(width).take(count).map(|chunk| T::decode(chunk, swap)));
}

/// A dense matrix with an explicit storage order.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    order: StorageOrder,
    data: Data,
}

impl Matrix {
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `data` does not hold exactly
    /// `rows * cols` values.
    pub fn new(rows: usize, cols: usize, order: StorageOrder, data: Data) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(Error::InvalidArgument("matrix data length does not match its shape"));
        }
        Ok(Self {
            rows,
            cols,
            order,
            data,
        })
    }

    /// Builds a matrix by evaluating `f(row, col)` for every cell.
    pub fn from_fn<T: Scalar>(
        rows: usize,
        cols: usize,
        order: StorageOrder,
        mut f: impl FnMut(usize, usize) -> T,
    ) -> Self {
        let mut values = Vec::with_capacity(rows * cols);
        match order {
            StorageOrder::RowMajor => {
                for r in 0..rows {
                    for c in 0..cols {
                        values.push(f(r, c));
                    }
                }
            }
            StorageOrder::ColumnMajor => {
                for c in 0..cols {
                    for r in 0..rows {
                        values.push(f(r, c));
                    }
                }
            }
        }
        Self {
            rows,
            cols,
            order,
            data: T::into_data(values),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn order(&self) -> StorageOrder {
        self.order
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.data.scalar_type()
    }

    /// Position of logical cell `(row, col)` in the storage array.
    pub fn index(&self, row: usize, col: usize) -> usize {
        storage_index(self.order, self.rows, self.cols, row, col)
    }

    pub fn get<T: Scalar>(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.data.as_slice::<T>()?.get(self.index(row, col)).copied()
    }

    pub fn value(&self, row: usize, col: usize) -> Option<ScalarValue> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.data.get(self.index(row, col))
    }

    /// The same logical matrix stored in `order`.
    pub fn to_order(&self, order: StorageOrder) -> Matrix {
        if order == self.order {
            return self.clone();
        }
        let data = with_data!(&self.data, v => Data::new(reorder(v, self.rows, self.cols, self.order)));
        Matrix {
            rows: self.rows,
            cols: self.cols,
            order,
            data,
        }
    }

    /// Wraps `data`, which the caller decoded with exactly `rows * cols`
    /// values.
    pub(crate) fn from_parts(rows: usize, cols: usize, order: StorageOrder, data: Data) -> Self {
        debug_assert_eq!(rows * cols, data.len());
        Self {
            rows,
            cols,
            order,
            data,
        }
    }

    pub(crate) fn data_mut(&mut self) -> &mut Data {
        &mut self.data
    }

    pub(crate) fn set_layout(&mut self, rows: usize, cols: usize, order: StorageOrder) {
        self.rows = rows;
        self.cols = cols;
        self.order = order;
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for r in 0..self.rows {
            if r > 0 {
                f.write_str(", ")?;
            }
            write_list(f, (0..self.cols).filter_map(|c| self.value(r, c)))?;
        }
        f.write_str("]")
    }
}

pub(crate) fn storage_index(order: StorageOrder, rows: usize, cols: usize, row: usize, col: usize) -> usize {
    match order {
        StorageOrder::RowMajor => row * cols + col,
        StorageOrder::ColumnMajor => col * rows + row,
    }
}

/// Rearranges `src`, stored in `from` order, into the opposite order.
///
/// The destination is filled front to back so writes stay sequential.
pub(crate) fn reorder<T: Scalar>(src: &[T], rows: usize, cols: usize, from: StorageOrder) -> Vec<T> {
    let mut out = Vec::with_capacity(src.len());
    match from {
        StorageOrder::RowMajor => {
            for c in 0..cols {
                for r in 0..rows {
                    out.push(src[r * cols + c]);
                }
            }
        }
        StorageOrder::ColumnMajor => {
            for r in 0..rows {
                for c in 0..cols {
                    out.push(src[c * rows + r]);
                }
            }
        }
    }
    out
}

/// One component of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(ScalarValue),
    Vector(Data),
    Matrix(Matrix),
}

impl Value {
    pub fn scalar<T: Scalar>(value: T) -> Self {
        Value::Scalar(value.into_value())
    }

    pub fn vector<T: Scalar>(values: Vec<T>) -> Self {
        Value::Vector(T::into_data(values))
    }

    pub fn as_scalar<T: Scalar>(&self) -> Option<T> {
        match self {
            Value::Scalar(v) => v.get(),
            _ => None,
        }
    }

    pub fn as_vector<T: Scalar>(&self) -> Option<&[T]> {
        match self {
            Value::Vector(data) => data.as_slice(),
            _ => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Matrix> {
        match self {
            Value::Matrix(m) => Some(m),
            _ => None,
        }
    }

    /// True if the value has the shape and scalar type of `component`.
    /// Matrix storage order is not part of the shape.
    pub fn matches(&self, component: &Component) -> bool {
        match (self, component) {
            (Value::Scalar(v), Component::Scalar(ty)) => v.scalar_type() == *ty,
            (Value::Vector(data), Component::Vector { scalar, len }) => {
                data.scalar_type() == *scalar && data.len() == *len as usize
            }
            (Value::Matrix(m), Component::Matrix { scalar, rows, cols, .. }) => {
                m.scalar_type() == *scalar && m.rows() == *rows as usize && m.cols() == *cols as usize
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{v}"),
            Value::Vector(data) => write!(f, "{data}"),
            Value::Matrix(m) => write!(f, "{m}"),
        }
    }
}

impl From<Matrix> for Value {
    fn from(matrix: Matrix) -> Self {
        Value::Matrix(matrix)
    }
}
