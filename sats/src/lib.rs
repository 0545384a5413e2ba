//! Algebraic type system and BSATN binary codec.
//!
//! This crate defines the value model every row, reducer argument, and wire
//! payload is expressed in:
//! - Algebraic types: sums, products, and builtin scalar/collection types
//! - Algebraic values, with bit-exact float representation
//! - The BSATN byte encoding and its strict decoder
//!
//! # Design Principles
//!
//! - **Deterministic** - Encoding the same value twice yields identical bytes.
//! - **Mutual inverses** - `decode(encode(v)) == v` for every schema-valid `v`.
//! - **Strict decoding** - Truncated input, out-of-range tags, and trailing
//!   bytes are errors, never silently coerced into defaults.
//! - **Schema-directed** - Products carry no framing; the decoder must know
//!   the type to know where one field ends and the next begins.

mod decode;
mod encode;
mod error;
mod reader;
mod types;
mod value;
mod writer;

pub use decode::{decode, from_slice};
pub use encode::{encode, to_vec};
pub use error::{DecodeError, DecodeResult, EncodeError, EncodeResult};
pub use reader::ByteReader;
pub use types::{
    AlgebraicType, BuiltinType, ProductElement, ProductType, SumType, SumVariant,
};
pub use value::{AlgebraicValue, BuiltinValue, F32Bits, F64Bits, ProductValue, SumValue};
pub use writer::ByteWriter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        // Verify all expected items are exported
        let _ = AlgebraicType::unit();
        let _ = BuiltinType::Bool;
        let _ = AlgebraicValue::unit();
        let _ = BuiltinValue::Bool(true);
        let _ = ByteReader::new(&[]);
        let _ = ByteWriter::new();

        // Error types
        let _: EncodeResult<()> = Ok(());
        let _: DecodeResult<()> = Ok(());
    }

    #[test]
    fn unit_round_trip_through_top_level_api() {
        let ty = AlgebraicType::unit();
        let value = AlgebraicValue::unit();
        let bytes = to_vec(&value, &ty).unwrap();
        assert!(bytes.is_empty(), "unit encodes to zero bytes");
        assert_eq!(from_slice(&bytes, &ty).unwrap(), value);
    }

    #[test]
    fn float_bits_round_trip() {
        let bits = F32Bits::from_f32(-0.0);
        assert_eq!(bits.to_f32().to_bits(), (-0.0f32).to_bits());
    }
}
