//! Algebraic value definitions.
//!
//! Values are immutable once constructed and owned by whichever row or
//! argument holds them. Floats are stored as raw bit patterns so the whole
//! value tree is `Eq + Hash` and NaN payloads and signed zero survive
//! round-trips bit-for-bit.

/// An algebraic value: sum, product, or builtin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlgebraicValue {
    Sum(SumValue),
    Product(ProductValue),
    Builtin(BuiltinValue),
}

/// A sum value: a variant tag plus an optional payload.
///
/// `value` is `None` iff the selected variant is the unit type; such a
/// variant contributes zero payload bytes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SumValue {
    pub tag: u8,
    pub value: Option<Box<AlgebraicValue>>,
}

/// A product value: an ordered sequence of field values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProductValue {
    pub elements: Vec<AlgebraicValue>,
}

/// A builtin scalar or collection value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuiltinValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    I128(i128),
    F32(F32Bits),
    F64(F64Bits),
    String(Box<str>),
    Array(Vec<AlgebraicValue>),
    /// Entries in insertion order; encoding preserves this order.
    Map(Vec<(AlgebraicValue, AlgebraicValue)>),
}

/// An `f32` stored as its raw bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct F32Bits(u32);

/// An `f64` stored as its raw bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct F64Bits(u64);

impl F32Bits {
    /// Wraps a float, preserving its exact bit pattern.
    #[must_use]
    pub const fn from_f32(value: f32) -> Self {
        Self(value.to_bits())
    }

    /// Wraps a raw bit pattern.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the float this bit pattern represents.
    #[must_use]
    pub const fn to_f32(self) -> f32 {
        f32::from_bits(self.0)
    }

    /// Returns the raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl F64Bits {
    /// Wraps a float, preserving its exact bit pattern.
    #[must_use]
    pub const fn from_f64(value: f64) -> Self {
        Self(value.to_bits())
    }

    /// Wraps a raw bit pattern.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the float this bit pattern represents.
    #[must_use]
    pub const fn to_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Returns the raw bit pattern.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }
}

impl AlgebraicValue {
    /// The unit value: an empty product.
    #[must_use]
    pub const fn unit() -> Self {
        Self::Product(ProductValue {
            elements: Vec::new(),
        })
    }

    /// A sum value carrying a payload.
    #[must_use]
    pub fn sum(tag: u8, value: Self) -> Self {
        Self::Sum(SumValue {
            tag,
            value: Some(Box::new(value)),
        })
    }

    /// A payload-free sum value selecting a unit variant.
    #[must_use]
    pub const fn unit_sum(tag: u8) -> Self {
        Self::Sum(SumValue { tag, value: None })
    }

    /// An option `some` value (tag 0 by convention, see
    /// [`AlgebraicType::option`](crate::AlgebraicType::option)).
    #[must_use]
    pub fn some(value: Self) -> Self {
        Self::sum(0, value)
    }

    /// An option `none` value (tag 1 by convention).
    #[must_use]
    pub const fn none() -> Self {
        Self::unit_sum(1)
    }

    /// A string value.
    #[must_use]
    pub fn string(value: &str) -> Self {
        Self::Builtin(BuiltinValue::String(value.into()))
    }

    /// A short name for the value's shape, used in error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Sum(_) => "sum",
            Self::Product(_) => "product",
            Self::Builtin(b) => b.kind_name(),
        }
    }
}

impl BuiltinValue {
    /// A short name for the value's shape, used in error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::U128(_) => "u128",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::I128(_) => "i128",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
        }
    }
}

impl ProductValue {
    /// Creates a product value from field values.
    #[must_use]
    pub fn new(elements: Vec<AlgebraicValue>) -> Self {
        Self { elements }
    }

    /// Returns the field at `index`, if present.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&AlgebraicValue> {
        self.elements.get(index)
    }
}

impl From<ProductValue> for AlgebraicValue {
    fn from(value: ProductValue) -> Self {
        Self::Product(value)
    }
}

impl From<BuiltinValue> for AlgebraicValue {
    fn from(value: BuiltinValue) -> Self {
        Self::Builtin(value)
    }
}

impl From<SumValue> for AlgebraicValue {
    fn from(value: SumValue) -> Self {
        Self::Sum(value)
    }
}
