// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The wire codec: a text-based, space-delimited encoding for scalars,
//! strings, ordered sequences, and fixed-order records.
//!
//! Every composite encoding is self-delimiting given the *statically known*
//! type of the value being decoded — there are no type tags on the wire.
//! Callers must decode against the same type the encoder used.

use crate::error::DecodeError;

/// A value that can be written to the wire in this crate's text codec.
pub trait Encode {
    fn encode(&self, buf: &mut Vec<u8>);
}

/// A value that can be read back off the wire.
///
/// `decode` advances `buf` past the bytes it consumed, so that callers can
/// decode a sequence of values from one contiguous slice (e.g. a tuple of
/// procedure arguments) without re-slicing by hand.
pub trait Decode: Sized {
    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError>;
}

/// Splits off the next whitespace-delimited token, leaving `buf` positioned
/// just after the separating space.
///
/// This never backtracks: once a token boundary is consumed it is gone, which
/// is what makes length-prefixed strings safe even when their content starts
/// with a digit — the reader for a string never calls `read_token` on the
/// string's own bytes, only on its length prefix.
pub(crate) fn read_token<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], DecodeError> {
    let pos = buf
        .iter()
        .position(|&b| b == b' ')
        .ok_or(DecodeError::UnexpectedEof)?;
    let (token, rest) = buf.split_at(pos);
    *buf = &rest[1..];
    Ok(token)
}

pub(crate) fn take_exact<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if buf.len() < n {
        return Err(DecodeError::TruncatedString);
    }
    let (head, rest) = buf.split_at(n);
    *buf = rest;
    Ok(head)
}

pub(crate) fn expect_space(buf: &mut &[u8]) -> Result<(), DecodeError> {
    match buf.split_first() {
        Some((b' ', rest)) => {
            *buf = rest;
            Ok(())
        }
        Some(_) => Err(DecodeError::MissingSeparator),
        None => Err(DecodeError::UnexpectedEof),
    }
}

macro_rules! impl_int_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(self.to_string().as_bytes());
                    buf.push(b' ');
                }
            }

            impl Decode for $ty {
                fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
                    let token = read_token(buf)?;
                    let s = std::str::from_utf8(token).map_err(|_| DecodeError::MalformedInteger)?;
                    s.parse::<$ty>().map_err(|_| DecodeError::MalformedInteger)
                }
            }
        )*
    };
}

impl_int_scalar!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

macro_rules! impl_float_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, buf: &mut Vec<u8>) {
                    buf.extend_from_slice(self.to_string().as_bytes());
                    buf.push(b' ');
                }
            }

            impl Decode for $ty {
                fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
                    let token = read_token(buf)?;
                    let s = std::str::from_utf8(token).map_err(|_| DecodeError::MalformedInteger)?;
                    s.parse::<$ty>().map_err(|_| DecodeError::MalformedInteger)
                }
            }
        )*
    };
}

impl_float_scalar!(f32, f64);

impl Encode for bool {
    fn encode(&self, buf: &mut Vec<u8>) {
        (*self as u8).encode(buf);
    }
}

impl Decode for bool {
    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(u8::decode(buf)? != 0)
    }
}

/// Strings are encoded as `<byte-length> ' ' <bytes> ' '`: the length prefix
/// makes the content self-delimiting regardless of what bytes it contains.
impl Encode for String {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.len().encode(buf);
        buf.extend_from_slice(self.as_bytes());
        buf.push(b' ');
    }
}

impl Decode for String {
    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = usize::decode(buf)?;
        let bytes = take_exact(buf, len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|_| DecodeError::TruncatedString)?
            .to_owned();
        expect_space(buf)?;
        Ok(s)
    }
}

impl Encode for str {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.len().encode(buf);
        buf.extend_from_slice(self.as_bytes());
        buf.push(b' ');
    }
}

/// Ordered sequences are encoded as `<count> ' ' <elem0><elem1>...<elemN-1>`.
impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.len().encode(buf);
        for item in self {
            item.encode(buf);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let count = usize::decode(buf)?;
        let mut items = Vec::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            items.push(T::decode(buf)?);
        }
        Ok(items)
    }
}

/// Declares a fixed-arity record type whose fields encode in declaration
/// order with no field names on the wire. Both
/// endpoints must agree on field order; this macro exists so records don't
/// need hand-written boilerplate for every struct, playing the role the
/// teacher's build-time XDR code generator played for its own (binary) wire
/// format.
#[macro_export]
macro_rules! record_type {
    ($(#[$meta:meta])* $vis:vis struct $name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis struct $name {
            $(pub $field: $ty,)*
        }

        impl $crate::codec::Encode for $name {
            fn encode(&self, buf: &mut Vec<u8>) {
                $( self.$field.encode(buf); )*
            }
        }

        impl $crate::codec::Decode for $name {
            fn decode(buf: &mut &[u8]) -> Result<Self, $crate::error::DecodeError> {
                Ok(Self {
                    $( $field: <$ty as $crate::codec::Decode>::decode(buf)?, )*
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: Encode + Decode + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = Vec::new();
        value.encode(&mut buf);
        let mut rest = buf.as_slice();
        let decoded = T::decode(&mut rest).expect("decode should succeed");
        assert!(rest.is_empty(), "decode should consume the whole buffer");
        assert_eq!(value, decoded);
    }

    #[test]
    fn integers_round_trip() {
        round_trip(0i32);
        round_trip(-17i32);
        round_trip(u64::MAX);
        round_trip(i64::MIN);
    }

    #[test]
    fn add_example_matches_spec() {
        // add(1, 1) request args encode as "1 1 "
        let mut buf = Vec::new();
        1i32.encode(&mut buf);
        1i32.encode(&mut buf);
        assert_eq!(buf, b"1 1 ");
    }

    #[test]
    fn strings_round_trip() {
        round_trip(String::new());
        round_trip(String::from("hello, clnt!\nhahaha"));
    }

    #[test]
    fn hello_example_matches_spec() {
        // inner bytes begin "19 hello, clnt!\nhahaha "
        let mut buf = Vec::new();
        String::from("hello, clnt!\nhahaha").encode(&mut buf);
        assert_eq!(buf, b"19 hello, clnt!\nhahaha ");
    }

    #[test]
    fn sequences_round_trip() {
        round_trip(Vec::<i32>::new());
        round_trip(vec![0i64, 1, 1]);
        round_trip(vec!["a".to_string(), "bb".to_string()]);
    }

    #[test]
    fn two_sum_example_matches_spec() {
        // twoSum(...) payload = [0, 1], sequence length prefix 2
        let mut buf = Vec::new();
        vec![0i64, 1i64].encode(&mut buf);
        assert_eq!(buf, b"2 0 1 ");
    }

    #[test]
    fn truncated_string_is_a_decode_error() {
        let mut buf: &[u8] = b"5 ab ";
        assert!(matches!(
            String::decode(&mut buf),
            Err(DecodeError::TruncatedString)
        ));
    }

    #[test]
    fn malformed_integer_is_a_decode_error() {
        let mut buf: &[u8] = b"not-a-number ";
        assert!(matches!(
            i32::decode(&mut buf),
            Err(DecodeError::MalformedInteger)
        ));
    }

    record_type! {
        #[derive(Default)]
        pub struct Point { x: i32, y: i32 }
    }

    #[test]
    fn record_round_trips_in_declaration_order() {
        round_trip(Point { x: 3, y: -4 });
    }
}
