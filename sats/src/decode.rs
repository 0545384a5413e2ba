//! BSATN decoding: bytes + type → algebraic value.

use crate::error::{DecodeError, DecodeResult};
use crate::reader::ByteReader;
use crate::types::{AlgebraicType, BuiltinType, ProductType, SumType};
use crate::value::{
    AlgebraicValue, BuiltinValue, F32Bits, F64Bits, ProductValue, SumValue,
};

/// Decodes one value of type `ty` from the reader.
///
/// The reader is left positioned after the value; callers decoding a single
/// top-level value should prefer [`from_slice`], which also rejects trailing
/// bytes.
pub fn decode(reader: &mut ByteReader<'_>, ty: &AlgebraicType) -> DecodeResult<AlgebraicValue> {
    match ty {
        AlgebraicType::Sum(sum_ty) => decode_sum(reader, sum_ty),
        AlgebraicType::Product(product_ty) => decode_product(reader, product_ty),
        AlgebraicType::Builtin(builtin_ty) => decode_builtin(reader, builtin_ty),
    }
}

/// Decodes a single top-level value, rejecting unconsumed trailing bytes.
pub fn from_slice(bytes: &[u8], ty: &AlgebraicType) -> DecodeResult<AlgebraicValue> {
    let mut reader = ByteReader::new(bytes);
    let value = decode(&mut reader, ty)?;
    if !reader.is_empty() {
        return Err(DecodeError::TrailingBytes {
            remaining: reader.remaining(),
        });
    }
    Ok(value)
}

fn decode_sum(reader: &mut ByteReader<'_>, ty: &SumType) -> DecodeResult<AlgebraicValue> {
    let tag = reader.read_u8()?;
    let variant = ty
        .variants
        .get(tag as usize)
        .ok_or(DecodeError::TagOutOfRange {
            tag,
            variants: ty.variants.len(),
        })?;

    let value = if variant.ty.is_unit() {
        None
    } else {
        Some(Box::new(decode(reader, &variant.ty)?))
    };
    Ok(AlgebraicValue::Sum(SumValue { tag, value }))
}

fn decode_product(reader: &mut ByteReader<'_>, ty: &ProductType) -> DecodeResult<AlgebraicValue> {
    let mut elements = Vec::with_capacity(ty.elements.len());
    for element in &ty.elements {
        elements.push(decode(reader, &element.ty)?);
    }
    Ok(AlgebraicValue::Product(ProductValue { elements }))
}

fn decode_builtin(reader: &mut ByteReader<'_>, ty: &BuiltinType) -> DecodeResult<AlgebraicValue> {
    let value = match ty {
        BuiltinType::Bool => match reader.read_u8()? {
            0 => BuiltinValue::Bool(false),
            1 => BuiltinValue::Bool(true),
            found => return Err(DecodeError::InvalidBool { found }),
        },
        BuiltinType::U8 => BuiltinValue::U8(reader.read_u8()?),
        BuiltinType::U16 => BuiltinValue::U16(reader.read_u16()?),
        BuiltinType::U32 => BuiltinValue::U32(reader.read_u32()?),
        BuiltinType::U64 => BuiltinValue::U64(reader.read_u64()?),
        BuiltinType::U128 => BuiltinValue::U128(reader.read_u128()?),
        BuiltinType::I8 => BuiltinValue::I8(reader.read_i8()?),
        BuiltinType::I16 => BuiltinValue::I16(reader.read_i16()?),
        BuiltinType::I32 => BuiltinValue::I32(reader.read_i32()?),
        BuiltinType::I64 => BuiltinValue::I64(reader.read_i64()?),
        BuiltinType::I128 => BuiltinValue::I128(reader.read_i128()?),
        BuiltinType::F32 => BuiltinValue::F32(F32Bits::from_bits(reader.read_u32()?)),
        BuiltinType::F64 => BuiltinValue::F64(F64Bits::from_bits(reader.read_u64()?)),
        BuiltinType::String => {
            let len = reader.read_len()?;
            let bytes = reader.read_bytes(len)?;
            let s = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)?;
            BuiltinValue::String(s.into())
        }
        BuiltinType::Array(elem_ty) => {
            let len = reader.read_len()?;
            // Cap pre-allocation by what the buffer could possibly hold
            let mut elems = Vec::with_capacity(len.min(reader.remaining()));
            for _ in 0..len {
                elems.push(decode(reader, elem_ty)?);
            }
            BuiltinValue::Array(elems)
        }
        BuiltinType::Map { key, value } => {
            let len = reader.read_len()?;
            let mut entries = Vec::with_capacity(len.min(reader.remaining()));
            for _ in 0..len {
                let k = decode(reader, key)?;
                let v = decode(reader, value)?;
                entries.push((k, v));
            }
            BuiltinValue::Map(entries)
        }
    };
    Ok(AlgebraicValue::Builtin(value))
}
