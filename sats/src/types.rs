//! Algebraic type definitions.
//!
//! Types are runtime values: the core is schema-generic and operates over
//! descriptions built at startup (typically from a server-published module
//! schema), not over compile-time reflection.

/// An algebraic type: sum, product, or builtin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlgebraicType {
    Sum(SumType),
    Product(ProductType),
    Builtin(BuiltinType),
}

/// A sum type: an ordered list of variants.
///
/// The on-wire tag of a variant is its position in this list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SumType {
    pub variants: Vec<SumVariant>,
}

/// A single variant of a sum type.
///
/// The name is schema metadata only and is never encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SumVariant {
    pub name: Option<Box<str>>,
    pub ty: AlgebraicType,
}

/// A product type: an ordered list of fields.
///
/// Field order is the only on-wire identity of a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductType {
    pub elements: Vec<ProductElement>,
}

/// A single field of a product type.
///
/// The name is schema metadata only and is never encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductElement {
    pub name: Option<Box<str>>,
    pub ty: AlgebraicType,
}

/// A builtin scalar or collection type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    U128,
    I8,
    I16,
    I32,
    I64,
    I128,
    F32,
    F64,
    /// UTF-8 string, `u32` length-prefixed.
    String,
    /// Homogeneous sequence, `u32` length-prefixed.
    Array(Box<AlgebraicType>),
    /// Key/value sequence, `u32` length-prefixed, insertion-ordered.
    Map {
        key: Box<AlgebraicType>,
        value: Box<AlgebraicType>,
    },
}

impl AlgebraicType {
    /// The unit type: a product with no fields. Encodes to zero bytes.
    #[must_use]
    pub const fn unit() -> Self {
        Self::Product(ProductType {
            elements: Vec::new(),
        })
    }

    /// An option type: a two-variant sum of `some(inner)` and `none`.
    #[must_use]
    pub fn option(inner: Self) -> Self {
        Self::Sum(SumType {
            variants: vec![
                SumVariant::new("some", inner),
                SumVariant::new("none", Self::unit()),
            ],
        })
    }

    /// An array type.
    #[must_use]
    pub fn array(elem: Self) -> Self {
        Self::Builtin(BuiltinType::Array(Box::new(elem)))
    }

    /// A map type.
    #[must_use]
    pub fn map(key: Self, value: Self) -> Self {
        Self::Builtin(BuiltinType::Map {
            key: Box::new(key),
            value: Box::new(value),
        })
    }

    /// Shorthand for a builtin type.
    #[must_use]
    pub const fn builtin(ty: BuiltinType) -> Self {
        Self::Builtin(ty)
    }

    /// Returns `true` for the unit type (an empty product).
    #[must_use]
    pub fn is_unit(&self) -> bool {
        matches!(self, Self::Product(p) if p.elements.is_empty())
    }

    /// A short name for the type's shape, used in error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Sum(_) => "sum",
            Self::Product(_) => "product",
            Self::Builtin(_) => "builtin",
        }
    }
}

impl SumType {
    /// Creates a sum type from variants.
    #[must_use]
    pub fn new(variants: Vec<SumVariant>) -> Self {
        Self { variants }
    }
}

impl SumVariant {
    /// Creates a named variant.
    #[must_use]
    pub fn new(name: &str, ty: AlgebraicType) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }

    /// Creates an unnamed variant.
    #[must_use]
    pub const fn unnamed(ty: AlgebraicType) -> Self {
        Self { name: None, ty }
    }

    /// Creates a named unit variant (no payload bytes on the wire).
    #[must_use]
    pub fn unit(name: &str) -> Self {
        Self::new(name, AlgebraicType::unit())
    }
}

impl ProductType {
    /// Creates a product type from fields.
    #[must_use]
    pub fn new(elements: Vec<ProductElement>) -> Self {
        Self { elements }
    }
}

impl ProductElement {
    /// Creates a named field.
    #[must_use]
    pub fn new(name: &str, ty: AlgebraicType) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }

    /// Creates an unnamed field.
    #[must_use]
    pub const fn unnamed(ty: AlgebraicType) -> Self {
        Self { name: None, ty }
    }
}
