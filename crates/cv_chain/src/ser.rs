//! Canonical serialization: LEB128 varints, raw fixed-size types,
//! varint-count-prefixed vectors, concatenated pairs.
//!
//! A full deserialize that leaves bytes unconsumed is an error; readers call
//! `Reader::expect_eof` after the last field.

use crate::error::ChainError;

/// Encoded size of `value` as a varint.
pub const fn varint_size(value: u64) -> usize {
    let mut size = 1;
    let mut v = value;
    while v > 0x7f {
        size += 1;
        v >>= 7;
    }
    size
}

/// Append `value` as an LEB128 varint (7 data bits per byte, high bit set on
/// every byte but the last).
pub fn write_varint(out: &mut Vec<u8>, value: u64) {
    let mut v = value;
    while v > 0x7f {
        out.push(0x80 | (v as u8 & 0x7f));
        v >>= 7;
    }
    out.push(v as u8);
}

/// Borrowing reader over a serialized buffer.
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn read_varint(&mut self) -> Result<u64, ChainError> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let &byte = self.data.first().ok_or(ChainError::Truncated)?;
            self.data = &self.data[1..];
            if shift >= 64 || (shift == 63 && byte > 1) {
                return Err(ChainError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8], ChainError> {
        if self.data.len() < len {
            return Err(ChainError::Truncated);
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    pub fn read_bool(&mut self) -> Result<bool, ChainError> {
        match self.read_exact(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ChainError::InvalidBool(other)),
        }
    }

    pub fn expect_eof(&self) -> Result<(), ChainError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(ChainError::TrailingBytes)
        }
    }
}

/// A value with a canonical byte layout.
pub trait WireSerialize {
    fn serialized_size(&self) -> usize;
    fn write(&self, out: &mut Vec<u8>);
}

pub trait WireDeserialize: Sized {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError>;
}

/// Serialize into an exactly-sized buffer.
pub fn serialize<T: WireSerialize>(value: &T) -> Vec<u8> {
    let size = value.serialized_size();
    let mut out = Vec::with_capacity(size);
    value.write(&mut out);
    debug_assert_eq!(out.len(), size);
    out
}

/// Deserialize a whole buffer; trailing bytes are an error.
pub fn deserialize<T: WireDeserialize>(data: &[u8]) -> Result<T, ChainError> {
    let mut reader = Reader::new(data);
    let value = T::read(&mut reader)?;
    reader.expect_eof()?;
    Ok(value)
}

impl WireSerialize for bool {
    fn serialized_size(&self) -> usize {
        1
    }
    fn write(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }
}

impl WireDeserialize for bool {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        reader.read_bool()
    }
}

impl<A: WireSerialize, B: WireSerialize> WireSerialize for (A, B) {
    fn serialized_size(&self) -> usize {
        self.0.serialized_size() + self.1.serialized_size()
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.0.write(out);
        self.1.write(out);
    }
}

impl<A: WireDeserialize, B: WireDeserialize> WireDeserialize for (A, B) {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok((A::read(reader)?, B::read(reader)?))
    }
}

impl<T: WireSerialize> WireSerialize for Vec<T> {
    fn serialized_size(&self) -> usize {
        varint_size(self.len() as u64)
            + self.iter().map(WireSerialize::serialized_size).sum::<usize>()
    }
    fn write(&self, out: &mut Vec<u8>) {
        write_varint(out, self.len() as u64);
        for item in self {
            item.write(out);
        }
    }
}

impl<T: WireDeserialize> WireDeserialize for Vec<T> {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        let count = reader.read_varint()?;
        // Every element consumes at least one byte, so a count larger than
        // the remaining input is corrupt and must not drive allocation.
        if count > reader.remaining() as u64 {
            return Err(ChainError::Truncated);
        }
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }
}

/// Implement the wire traits for a fixed-size byte newtype.
macro_rules! impl_wire_fixed {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl crate::ser::WireSerialize for $ty {
                fn serialized_size(&self) -> usize {
                    <$ty>::SIZE
                }
                fn write(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(self.as_ref());
                }
            }

            impl crate::ser::WireDeserialize for $ty {
                fn read(
                    reader: &mut crate::ser::Reader<'_>,
                ) -> Result<Self, crate::error::ChainError> {
                    let bytes = reader.read_exact(<$ty>::SIZE)?;
                    Ok(<$ty>::try_from(bytes)?)
                }
            }
        )+
    };
}

impl_wire_fixed!(
    cv_crypto::Hash,
    cv_crypto::Signature,
    cv_crypto::PublicSignatureKey,
    cv_crypto::PublicEncryptionKey,
    cv_crypto::SealedPrivateEncryptionKey,
    cv_crypto::SealedPrivateSignatureKey,
    cv_crypto::SealedSymmetricKey,
    cv_crypto::TwoTimesSealedSymmetricKey,
    cv_crypto::TwoTimesSealedPrivateEncryptionKey,
    cv_crypto::SealedPrivateEncryptionKeyPair,
    cv_crypto::Mac,
    cv_crypto::AeadIv,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_small_values_are_one_byte() {
        for v in [0u64, 1, 42, 127] {
            let mut out = Vec::new();
            write_varint(&mut out, v);
            assert_eq!(out.len(), 1);
            assert_eq!(varint_size(v), 1);
            assert_eq!(Reader::new(&out).read_varint().unwrap(), v);
        }
    }

    #[test]
    fn varint_multi_byte_round_trip() {
        for v in [128u64, 300, 16384, u32::MAX as u64, u64::MAX] {
            let mut out = Vec::new();
            write_varint(&mut out, v);
            assert_eq!(out.len(), varint_size(v));
            let mut reader = Reader::new(&out);
            assert_eq!(reader.read_varint().unwrap(), v);
            reader.expect_eof().unwrap();
        }
    }

    #[test]
    fn varint_truncated_continuation_fails() {
        let mut reader = Reader::new(&[0x80]);
        assert!(matches!(reader.read_varint(), Err(ChainError::Truncated)));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut buf = Vec::new();
        write_varint(&mut buf, 5);
        buf.push(0xff);
        let mut reader = Reader::new(&buf);
        reader.read_varint().unwrap();
        assert!(matches!(reader.expect_eof(), Err(ChainError::TrailingBytes)));
    }

    #[test]
    fn vec_round_trip_with_size() {
        let v: Vec<cv_crypto::Mac> = vec![
            cv_crypto::Mac::from([1u8; 16]),
            cv_crypto::Mac::from([2u8; 16]),
        ];
        let bytes = serialize(&v);
        assert_eq!(bytes.len(), v.serialized_size());
        assert_eq!(bytes[0], 2);
        let back: Vec<cv_crypto::Mac> = deserialize(&bytes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn oversized_vec_count_fails_fast() {
        // count = 2^40 with no elements behind it
        let mut buf = Vec::new();
        write_varint(&mut buf, 1 << 40);
        let res: Result<Vec<cv_crypto::Mac>, _> = deserialize(&buf);
        assert!(matches!(res, Err(ChainError::Truncated)));
    }
}
