// SPDX-License-Identifier: Apache-2.0

//! Encoding of data-plane payloads. A trivially copyable `T` is sent as
//! its raw bytes; `String` and `Vec<u8>` get hand-written specializations
//! since they're not `Pod` (their on-wire representation is just their
//! contents, with no length-prefix — the payload length *is* the length).

use bytemuck::Pod;

use crate::error::DataError;

pub trait Encode {
    fn encode(&self) -> Vec<u8>;
}

pub trait Decode: Sized {
    /// Decodes `bytes` into `Self`, or reports a type mismatch (a
    /// fixed-size `T` received a frame of the wrong length).
    fn decode(bytes: &[u8]) -> Result<Self, DataError>;
}

/// Blanket `Encode`/`Decode` for `Pod` types is not possible alongside the
/// `String`/`Vec<u8>` specializations below: both `Pod` and these types are
/// foreign to this crate, so the coherence checker can't rule out some
/// upstream crate adding `impl Pod for String`, and a blanket impl would
/// conflict (E0119). Fixed-size types implement `Encode`/`Decode`
/// individually via these helpers instead.
pub fn encode_pod<T: Pod>(value: &T) -> Vec<u8> {
    bytemuck::bytes_of(value).to_vec()
}

pub fn decode_pod<T: Pod>(bytes: &[u8]) -> Result<T, DataError> {
    let expected = std::mem::size_of::<T>();
    if bytes.len() != expected {
        return Err(DataError::TypeMismatch {
            expected,
            got: bytes.len(),
        });
    }
    Ok(*bytemuck::from_bytes::<T>(bytes))
}

macro_rules! impl_encode_for_pod {
    ($($t:ty),* $(,)?) => {
        $(
            impl Encode for $t {
                fn encode(&self) -> Vec<u8> {
                    encode_pod(self)
                }
            }
        )*
    };
}

macro_rules! impl_decode_for_pod {
    ($($t:ty),* $(,)?) => {
        $(
            impl Decode for $t {
                fn decode(bytes: &[u8]) -> Result<Self, DataError> {
                    decode_pod::<$t>(bytes)
                }
            }
        )*
    };
}

impl_encode_for_pod!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);
impl_decode_for_pod!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

impl Encode for String {
    fn encode(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl Decode for String {
    fn decode(bytes: &[u8]) -> Result<Self, DataError> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

impl Encode for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }
}

impl Decode for Vec<u8> {
    fn decode(bytes: &[u8]) -> Result<Self, DataError> {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_round_trips_exact_bytes() {
        let value: f64 = std::f64::consts::PI;
        let bytes = value.encode();
        let decoded = f64::decode(&bytes).unwrap();
        assert_eq!(decoded.to_bits(), value.to_bits());
    }

    #[test]
    fn pod_decode_rejects_wrong_length() {
        let err = f64::decode(&[0u8; 3]).unwrap_err();
        assert!(matches!(err, DataError::TypeMismatch { .. }));
    }

    #[test]
    fn string_round_trips_arbitrary_length() {
        let s = "Call me Ishmael.".to_string();
        let bytes = s.encode();
        assert_eq!(String::decode(&bytes).unwrap(), s);
    }
}
