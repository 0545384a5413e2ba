//! BSATN encoding: algebraic value + type → bytes.

use crate::error::{EncodeError, EncodeResult};
use crate::types::{AlgebraicType, BuiltinType, ProductType, SumType};
use crate::value::{AlgebraicValue, BuiltinValue, ProductValue, SumValue};
use crate::writer::ByteWriter;

/// Encodes a value against its type into `out`.
///
/// Encoding is deterministic: the same value always yields identical bytes.
/// Map entries are written in insertion order, never sorted.
pub fn encode(
    value: &AlgebraicValue,
    ty: &AlgebraicType,
    out: &mut ByteWriter,
) -> EncodeResult<()> {
    match (value, ty) {
        (AlgebraicValue::Sum(sum), AlgebraicType::Sum(sum_ty)) => encode_sum(sum, sum_ty, out),
        (AlgebraicValue::Product(product), AlgebraicType::Product(product_ty)) => {
            encode_product(product, product_ty, out)
        }
        (AlgebraicValue::Builtin(builtin), AlgebraicType::Builtin(builtin_ty)) => {
            encode_builtin(builtin, builtin_ty, out)
        }
        (value, ty) => Err(EncodeError::TypeMismatch {
            expected: ty.kind_name(),
            found: value.kind_name(),
        }),
    }
}

/// Encodes a value against its type into a fresh byte vector.
pub fn to_vec(value: &AlgebraicValue, ty: &AlgebraicType) -> EncodeResult<Vec<u8>> {
    let mut out = ByteWriter::new();
    encode(value, ty, &mut out)?;
    Ok(out.into_vec())
}

fn encode_sum(sum: &SumValue, ty: &SumType, out: &mut ByteWriter) -> EncodeResult<()> {
    let variant = ty
        .variants
        .get(sum.tag as usize)
        .ok_or(EncodeError::TagOutOfRange {
            tag: sum.tag,
            variants: ty.variants.len(),
        })?;

    out.write_u8(sum.tag);
    match &sum.value {
        Some(payload) => {
            if variant.ty.is_unit() {
                return Err(EncodeError::PayloadMismatch { tag: sum.tag });
            }
            encode(payload, &variant.ty, out)
        }
        None => {
            // The tag alone identifies a unit variant; zero payload bytes.
            if variant.ty.is_unit() {
                Ok(())
            } else {
                Err(EncodeError::PayloadMismatch { tag: sum.tag })
            }
        }
    }
}

fn encode_product(product: &ProductValue, ty: &ProductType, out: &mut ByteWriter) -> EncodeResult<()> {
    if product.elements.len() != ty.elements.len() {
        return Err(EncodeError::ArityMismatch {
            expected: ty.elements.len(),
            actual: product.elements.len(),
        });
    }
    // No length prefix, no separators: fields concatenate in declared order.
    for (value, element) in product.elements.iter().zip(&ty.elements) {
        encode(value, &element.ty, out)?;
    }
    Ok(())
}

fn encode_builtin(value: &BuiltinValue, ty: &BuiltinType, out: &mut ByteWriter) -> EncodeResult<()> {
    match (value, ty) {
        (BuiltinValue::Bool(v), BuiltinType::Bool) => {
            out.write_u8(u8::from(*v));
            Ok(())
        }
        (BuiltinValue::U8(v), BuiltinType::U8) => {
            out.write_u8(*v);
            Ok(())
        }
        (BuiltinValue::U16(v), BuiltinType::U16) => {
            out.write_u16(*v);
            Ok(())
        }
        (BuiltinValue::U32(v), BuiltinType::U32) => {
            out.write_u32(*v);
            Ok(())
        }
        (BuiltinValue::U64(v), BuiltinType::U64) => {
            out.write_u64(*v);
            Ok(())
        }
        (BuiltinValue::U128(v), BuiltinType::U128) => {
            out.write_u128(*v);
            Ok(())
        }
        (BuiltinValue::I8(v), BuiltinType::I8) => {
            out.write_i8(*v);
            Ok(())
        }
        (BuiltinValue::I16(v), BuiltinType::I16) => {
            out.write_i16(*v);
            Ok(())
        }
        (BuiltinValue::I32(v), BuiltinType::I32) => {
            out.write_i32(*v);
            Ok(())
        }
        (BuiltinValue::I64(v), BuiltinType::I64) => {
            out.write_i64(*v);
            Ok(())
        }
        (BuiltinValue::I128(v), BuiltinType::I128) => {
            out.write_i128(*v);
            Ok(())
        }
        // Raw bit pattern, not decimal text: lossless for NaN payloads and -0.0.
        (BuiltinValue::F32(v), BuiltinType::F32) => {
            out.write_u32(v.bits());
            Ok(())
        }
        (BuiltinValue::F64(v), BuiltinType::F64) => {
            out.write_u64(v.bits());
            Ok(())
        }
        (BuiltinValue::String(v), BuiltinType::String) => {
            out.write_len(v.len())?;
            out.write_bytes(v.as_bytes());
            Ok(())
        }
        (BuiltinValue::Array(elems), BuiltinType::Array(elem_ty)) => {
            out.write_len(elems.len())?;
            for elem in elems {
                encode(elem, elem_ty, out)?;
            }
            Ok(())
        }
        (BuiltinValue::Map(entries), BuiltinType::Map { key, value }) => {
            out.write_len(entries.len())?;
            for (k, v) in entries {
                encode(k, key, out)?;
                encode(v, value, out)?;
            }
            Ok(())
        }
        (value, _) => Err(EncodeError::TypeMismatch {
            expected: builtin_kind_name(ty),
            found: value.kind_name(),
        }),
    }
}

const fn builtin_kind_name(ty: &BuiltinType) -> &'static str {
    match ty {
        BuiltinType::Bool => "bool",
        BuiltinType::U8 => "u8",
        BuiltinType::U16 => "u16",
        BuiltinType::U32 => "u32",
        BuiltinType::U64 => "u64",
        BuiltinType::U128 => "u128",
        BuiltinType::I8 => "i8",
        BuiltinType::I16 => "i16",
        BuiltinType::I32 => "i32",
        BuiltinType::I64 => "i64",
        BuiltinType::I128 => "i128",
        BuiltinType::F32 => "f32",
        BuiltinType::F64 => "f64",
        BuiltinType::String => "string",
        BuiltinType::Array(_) => "array",
        BuiltinType::Map { .. } => "map",
    }
}
