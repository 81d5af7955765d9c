//! Record layout descriptions.
//!
//! A [`Schema`] is the ordered list of components making up one archive
//! element. Its header and element sizes are fixed once it is built.

use std::fmt;

use crate::archive::scalar::ScalarType;
use crate::{Error, Result};

/// Bytes before the first component descriptor: version, byte order, count.
pub const PREAMBLE_SIZE: usize = 3;
/// Trailing element count.
pub const COUNT_SIZE: usize = 8;
pub const MAX_COMPONENTS: usize = u8::MAX as usize;
/// Largest header any schema can produce.
pub const MAX_HEADER_SIZE: usize = PREAMBLE_SIZE + MAX_COMPONENTS * MATRIX_DESCRIPTOR_SIZE + COUNT_SIZE;

pub const SCALAR_DESCRIPTOR_SIZE: usize = 2;
pub const VECTOR_DESCRIPTOR_SIZE: usize = 6;
pub const MATRIX_DESCRIPTOR_SIZE: usize = 11;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOrder {
    RowMajor = 0,
    ColumnMajor = 1,
}

impl StorageOrder {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(StorageOrder::RowMajor),
            1 => Some(StorageOrder::ColumnMajor),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            StorageOrder::RowMajor => StorageOrder::ColumnMajor,
            StorageOrder::ColumnMajor => StorageOrder::RowMajor,
        }
    }
}

impl fmt::Display for StorageOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageOrder::RowMajor => f.write_str("row"),
            StorageOrder::ColumnMajor => f.write_str("col"),
        }
    }
}

/// Shape of one element component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Scalar(ScalarType),
    Vector {
        scalar: ScalarType,
        len: u32,
    },
    Matrix {
        scalar: ScalarType,
        rows: u32,
        cols: u32,
        order: StorageOrder,
    },
}

impl Component {
    pub fn scalar_type(&self) -> ScalarType {
        match *self {
            Component::Scalar(scalar) => scalar,
            Component::Vector { scalar, .. } | Component::Matrix { scalar, .. } => scalar,
        }
    }

    /// Dimension class byte: 0 scalar, 1 vector, 2 matrix.
    pub fn dimension(&self) -> u8 {
        match self {
            Component::Scalar(_) => 0,
            Component::Vector { .. } => 1,
            Component::Matrix { .. } => 2,
        }
    }

    pub fn descriptor_size(&self) -> usize {
        match self {
            Component::Scalar(_) => SCALAR_DESCRIPTOR_SIZE,
            Component::Vector { .. } => VECTOR_DESCRIPTOR_SIZE,
            Component::Matrix { .. } => MATRIX_DESCRIPTOR_SIZE,
        }
    }

    /// Number of scalars in the component.
    pub fn scalar_count(&self) -> usize {
        match *self {
            Component::Scalar(_) => 1,
            Component::Vector { len, .. } => len as usize,
            Component::Matrix { rows, cols, .. } => rows as usize * cols as usize,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.scalar_count() * self.scalar_type().width()
    }

    /// [`Component::byte_size`], or `None` if it does not fit in `usize`.
    fn checked_byte_size(&self) -> Option<usize> {
        let count = match *self {
            Component::Matrix { rows, cols, .. } => (rows as usize).checked_mul(cols as usize)?,
            _ => self.scalar_count(),
        };
        count.checked_mul(self.scalar_type().width())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Scalar(scalar) => write!(f, "{scalar}"),
            Component::Vector { scalar, len } => write!(f, "vec<{scalar},{len}>"),
            Component::Matrix {
                scalar,
                rows,
                cols,
                order,
            } => write!(f, "mat<{scalar},{rows},{cols},{order}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Schema {
    components: Vec<Component>,
    header_size: usize,
    element_size: usize,
}

impl Schema {
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchema`] for an empty schema, more than 255
    /// components, or a vector or matrix with a zero extent.
    pub fn new(components: Vec<Component>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::InvalidSchema("schema has no components"));
        }
        if components.len() > MAX_COMPONENTS {
            return Err(Error::InvalidSchema("schema has more than 255 components"));
        }
        let mut header_size = PREAMBLE_SIZE + COUNT_SIZE;
        let mut element_size = 0usize;
        for component in &components {
            match *component {
                Component::Vector { len: 0, .. } => {
                    return Err(Error::InvalidSchema("vector length must be non-zero"));
                }
                Component::Matrix { rows, cols, .. } if rows == 0 || cols == 0 => {
                    return Err(Error::InvalidSchema("matrix dimensions must be non-zero"));
                }
                _ => {}
            }
            header_size += component.descriptor_size();
            element_size = component
                .checked_byte_size()
                .and_then(|size| element_size.checked_add(size))
                .ok_or(Error::InvalidSchema("element size overflow"))?;
        }
        Ok(Self {
            components,
            header_size,
            element_size,
        })
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn matrix_count(&self) -> usize {
        self.components
            .iter()
            .filter(|c| matches!(c, Component::Matrix { .. }))
            .count()
    }

    /// Byte offset of each component within an element record.
    pub fn component_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.components.iter().scan(0usize, |offset, component| {
            let start = *offset;
            *offset += component.byte_size();
            Some(start)
        })
    }

    /// The same schema with every matrix stored in the other order.
    pub fn transposed_storage(&self) -> Schema {
        let components = self
            .components
            .iter()
            .map(|c| match *c {
                Component::Matrix {
                    scalar,
                    rows,
                    cols,
                    order,
                } => Component::Matrix {
                    scalar,
                    rows,
                    cols,
                    order: order.opposite(),
                },
                other => other,
            })
            .collect();
        Schema {
            components,
            header_size: self.header_size,
            element_size: self.element_size,
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{component}")?;
        }
        f.write_str(")")
    }
}
