//! Scalar element types and byte-order handling.

use std::fmt;

use crate::archive::value::{Data, ScalarValue};

/// Element type of a component; the discriminant is its on-disk code.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    I8 = 0,
    I16 = 1,
    I32 = 2,
    I64 = 3,
    U8 = 4,
    U16 = 5,
    U32 = 6,
    U64 = 7,
    F32 = 8,
    F64 = 9,
}

impl ScalarType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => ScalarType::I8,
            1 => ScalarType::I16,
            2 => ScalarType::I32,
            3 => ScalarType::I64,
            4 => ScalarType::U8,
            5 => ScalarType::U16,
            6 => ScalarType::U32,
            7 => ScalarType::U64,
            8 => ScalarType::F32,
            9 => ScalarType::F64,
            _ => return None,
        })
    }

    /// Encoded width in bytes.
    pub fn width(self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::I64 | ScalarType::U64 | ScalarType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarType::I8 => "i8",
            ScalarType::I16 => "i16",
            ScalarType::I32 => "i32",
            ScalarType::I64 => "i64",
            ScalarType::U8 => "u8",
            ScalarType::U16 => "u16",
            ScalarType::U32 => "u32",
            ScalarType::U64 => "u64",
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const INTEGER_BIG_ENDIAN: u8 = 0x01;
pub const FLOAT_BIG_ENDIAN: u8 = 0x10;

/// Byte order of integers and floats, recorded independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteOrder {
    pub integers_big_endian: bool,
    pub floats_big_endian: bool,
}

impl ByteOrder {
    pub const LITTLE: ByteOrder = ByteOrder {
        integers_big_endian: false,
        floats_big_endian: false,
    };
    pub const BIG: ByteOrder = ByteOrder {
        integers_big_endian: true,
        floats_big_endian: true,
    };

    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::BIG
        } else {
            Self::LITTLE
        }
    }

    /// The order that differs from the native one in both fields.
    pub fn foreign() -> Self {
        let native = Self::native();
        ByteOrder {
            integers_big_endian: !native.integers_big_endian,
            floats_big_endian: !native.floats_big_endian,
        }
    }

    pub fn from_flags(flags: u8) -> Self {
        ByteOrder {
            integers_big_endian: flags & INTEGER_BIG_ENDIAN != 0,
            floats_big_endian: flags & FLOAT_BIG_ENDIAN != 0,
        }
    }

    pub fn flags(self) -> u8 {
        let mut flags = 0;
        if self.integers_big_endian {
            flags |= INTEGER_BIG_ENDIAN;
        }
        if self.floats_big_endian {
            flags |= FLOAT_BIG_ENDIAN;
        }
        flags
    }

    /// Whether integers and floats in this order need swapping on this host.
    pub fn swaps(self) -> Swap {
        let native = Self::native();
        Swap {
            integers: self.integers_big_endian != native.integers_big_endian,
            floats: self.floats_big_endian != native.floats_big_endian,
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |big: bool| if big { "big" } else { "little" };
        write!(
            f,
            "integers {}-endian, floats {}-endian",
            name(self.integers_big_endian),
            name(self.floats_big_endian)
        )
    }
}

/// Per-stream byte-swap flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Swap {
    pub integers: bool,
    pub floats: bool,
}

impl Swap {
    pub fn applies_to(self, ty: ScalarType) -> bool {
        if ty.is_float() {
            self.floats
        } else {
            self.integers
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Rust types usable as archive scalars.
pub trait Scalar: sealed::Sealed + Copy + PartialEq + fmt::Debug + fmt::Display + 'static {
    const TYPE: ScalarType;

    /// Writes `self` into the first `TYPE.width()` bytes of `out`, reversing
    /// the byte order when `swap` is set.
    fn encode(self, out: &mut [u8], swap: bool);

    fn decode(bytes: &[u8], swap: bool) -> Self;

    fn slice(data: &Data) -> Option<&[Self]>;

    fn into_data(values: Vec<Self>) -> Data;

    fn take_vec(data: Data) -> Option<Vec<Self>>;

    fn from_value(value: ScalarValue) -> Option<Self>;

    fn into_value(self) -> ScalarValue;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const TYPE: ScalarType = ScalarType::$variant;

                #[inline]
                fn encode(self, out: &mut [u8], swap: bool) {
                    let mut bytes = self.to_ne_bytes();
                    if swap {
                        bytes.reverse();
                    }
                    out[..bytes.len()].copy_from_slice(&bytes);
                }

                #[inline]
                fn decode(bytes: &[u8], swap: bool) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                    if swap {
                        raw.reverse();
                    }
                    <$ty>::from_ne_bytes(raw)
                }

                fn slice(data: &Data) -> Option<&[Self]> {
                    match data {
                        Data::$variant(values) => Some(values),
                        _ => None,
                    }
                }

                fn into_data(values: Vec<Self>) -> Data {
                    Data::$variant(values)
                }

                fn take_vec(data: Data) -> Option<Vec<Self>> {
                    match data {
                        Data::$variant(values) => Some(values),
                        _ => None,
                    }
                }

                fn from_value(value: ScalarValue) -> Option<Self> {
                    match value {
                        ScalarValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_value(self) -> ScalarValue {
                    ScalarValue::$variant(self)
                }
            }

            impl From<$ty> for ScalarValue {
                fn from(value: $ty) -> Self {
                    ScalarValue::$variant(value)
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..10u8 {
            let ty = ScalarType::from_code(code).expect("known code");
            assert_eq!(ty.code(), code);
        }
        assert_eq!(ScalarType::from_code(10), None);
        assert_eq!(ScalarType::F64.width(), 8);
        assert_eq!(ScalarType::U16.width(), 2);
    }

    #[test]
    fn swap_is_full_width_reversal() {
        let mut out = [0u8; 4];
        0x0102_0304u32.encode(&mut out, true);
        assert_eq!(u32::from_ne_bytes(out), 0x0403_0201);
        assert_eq!(u32::decode(&out, true), 0x0102_0304);

        let mut out = [0u8; 8];
        1.5f64.encode(&mut out, true);
        let mut expected = 1.5f64.to_ne_bytes();
        expected.reverse();
        assert_eq!(out, expected);
        assert_eq!(f64::decode(&out, true), 1.5);

        let mut out = [0u8; 1];
        (-3i8).encode(&mut out, true);
        assert_eq!(i8::decode(&out, false), -3);
    }

    #[test]
    fn decode_reads_only_its_width() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0xAA, 0xBB];
        assert_eq!(u16::decode(&bytes, false), u16::from_ne_bytes([0x01, 0x02]));
        assert_eq!(u32::decode(&bytes, true), u32::from_ne_bytes([0x04, 0x03, 0x02, 0x01]));
        assert_eq!(i8::decode(&bytes[4..], false), 0xAAu8 as i8);
    }

    #[test]
    fn byte_order_flags() {
        assert_eq!(ByteOrder::BIG.flags(), 0x11);
        assert_eq!(ByteOrder::LITTLE.flags(), 0x00);
        let mixed = ByteOrder::from_flags(0x10);
        assert!(!mixed.integers_big_endian);
        assert!(mixed.floats_big_endian);
        assert_eq!(ByteOrder::native().swaps(), Swap::default());
        let swaps = ByteOrder::foreign().swaps();
        assert!(swaps.integers && swaps.floats);
        assert!(swaps.applies_to(ScalarType::F32));
    }
}
