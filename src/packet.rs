// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Procedure and return packets: the request and response envelopes
//! carried inside each wire frame.

use crate::codec::{read_token, take_exact, Decode, Encode};
use crate::error::DecodeError;

/// Status carried by every [`ReturnPacket`]. `code != SUCCESS` means the
/// payload bytes are a placeholder and must not be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    Unknown = 1,
    NoSuchProcedure = 2,
}

impl StatusCode {
    fn from_u8(v: u8) -> Result<Self, DecodeError> {
        match v {
            0 => Ok(Self::Success),
            1 => Ok(Self::Unknown),
            2 => Ok(Self::NoSuchProcedure),
            _ => Err(DecodeError::MalformedInteger),
        }
    }
}

impl Encode for StatusCode {
    fn encode(&self, buf: &mut Vec<u8>) {
        (*self as u8).encode(buf);
    }
}

impl Decode for StatusCode {
    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Self::from_u8(u8::decode(buf)?)
    }
}

/// The zero-valued placeholder used in place of a real payload when a
/// procedure is declared to return nothing. Encodes as a single scalar `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Void;

impl Encode for Void {
    fn encode(&self, buf: &mut Vec<u8>) {
        0i32.encode(buf);
    }
}

impl Decode for Void {
    fn decode(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let _ = i32::decode(buf)?;
        Ok(Void)
    }
}

/// A statically-typed argument tuple that can be written as the positional
/// arguments of a procedure packet.
pub trait ArgsEncode {
    fn encode_args(&self, buf: &mut Vec<u8>);
}

/// The decoding counterpart of [`ArgsEncode`], used by the dispatcher to
/// reconstruct a call's argument tuple against a registered handler's
/// declared signature.
pub trait ArgsDecode: Sized {
    fn decode_args(buf: &mut &[u8]) -> Result<Self, DecodeError>;
}

impl ArgsEncode for () {
    fn encode_args(&self, _buf: &mut Vec<u8>) {}
}

impl ArgsDecode for () {
    fn decode_args(_buf: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! impl_args_tuple {
    ($($idx:tt => $T:ident),+) => {
        impl<$($T: Encode),+> ArgsEncode for ($($T,)+) {
            fn encode_args(&self, buf: &mut Vec<u8>) {
                $( self.$idx.encode(buf); )+
            }
        }

        impl<$($T: Decode),+> ArgsDecode for ($($T,)+) {
            fn decode_args(buf: &mut &[u8]) -> Result<Self, DecodeError> {
                Ok(($( $T::decode(buf)?, )+))
            }
        }
    };
}

impl_args_tuple!(0 => A);
impl_args_tuple!(0 => A, 1 => B);
impl_args_tuple!(0 => A, 1 => B, 2 => C);
impl_args_tuple!(0 => A, 1 => B, 2 => C, 3 => D);

/// A call name must be a non-empty printable token with no embedded
/// whitespace: the name token is read by whitespace splitting and must
/// not itself contain a space.
pub fn validate_procedure_name(name: &str) -> Result<(), DecodeError> {
    if name.is_empty() || name.bytes().any(|b| b == b' ' || b.is_ascii_control()) {
        return Err(DecodeError::MalformedInteger);
    }
    Ok(())
}

/// The request envelope: a procedure name plus its positional argument tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedurePacket<Args> {
    pub name: String,
    pub args: Args,
}

impl<Args> ProcedurePacket<Args> {
    pub fn new(name: impl Into<String>, args: Args) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl<Args: ArgsEncode> ProcedurePacket<Args> {
    /// Encodes `<name> ' ' <arg_0> <arg_1> ...`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.name.as_bytes());
        buf.push(b' ');
        self.args.encode_args(&mut buf);
        buf
    }
}

/// Reads just the name token from an encoded procedure packet, leaving the
/// rest of the buffer (the still-encoded argument tuple) untouched.
///
/// This lets the dispatcher look the name up in its registry *before* it
/// knows (or needs) the tuple type the matched handler expects.
pub fn peek_name(buf: &[u8]) -> Result<(String, &[u8]), DecodeError> {
    let mut rest = buf;
    let token = read_token(&mut rest)?;
    let name = std::str::from_utf8(token)
        .map_err(|_| DecodeError::MalformedInteger)?
        .to_owned();
    Ok((name, rest))
}

impl<Args: ArgsDecode> ProcedurePacket<Args> {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let (name, mut rest) = peek_name(buf)?;
        let args = Args::decode_args(&mut rest)?;
        Ok(Self { name, args })
    }
}

/// The raw, not-yet-typed form of a decoded return packet: the status code
/// plus the still-encoded payload bytes. The dispatcher works exclusively at
/// this level since it never knows a caller's concrete `R`.
pub struct RawReturn<'a> {
    pub code: StatusCode,
    pub payload: &'a [u8],
}

/// Encodes `<code> ' ' <inner_len> ' ' <inner_bytes>`.
pub fn encode_return(code: StatusCode, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    code.encode(&mut buf);
    payload.len().encode(&mut buf);
    buf.extend_from_slice(payload);
    buf
}

/// Decodes a return packet without interpreting the payload, so that a
/// non-success code can be handled (or a connection can discard the frame)
/// without knowing `R`: the inner length prefix lets a caller read and
/// discard the payload safely even on a non-success code.
pub fn decode_return_raw(buf: &[u8]) -> Result<RawReturn<'_>, DecodeError> {
    let mut rest = buf;
    let code = StatusCode::decode(&mut rest)?;
    let len = usize::decode(&mut rest)?;
    let payload = take_exact(&mut rest, len)?;
    Ok(RawReturn { code, payload })
}

/// The typed response: `SUCCESS` carries a decoded payload of type `R`; any
/// other code carries no usable payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnPacket<R> {
    pub code: StatusCode,
    payload: Option<R>,
}

impl<R> ReturnPacket<R> {
    pub fn success(payload: R) -> Self {
        Self {
            code: StatusCode::Success,
            payload: Some(payload),
        }
    }

    /// Returns the payload if `code == SUCCESS`, otherwise `None` — callers
    /// must check `code` rather than assume a missing payload means failure,
    /// since a successful `void` call also carries a (discarded) payload.
    pub fn into_success(self) -> Option<R> {
        match self.code {
            StatusCode::Success => self.payload,
            _ => None,
        }
    }
}

impl<R: Decode> ReturnPacket<R> {
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let raw = decode_return_raw(buf)?;
        let payload = match raw.code {
            StatusCode::Success => {
                let mut p = raw.payload;
                Some(R::decode(&mut p)?)
            }
            _ => None,
        };
        Ok(Self {
            code: raw.code,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn procedure_packet_round_trips() {
        let packet = ProcedurePacket::new("add", (1i32, 1i32));
        let bytes = packet.encode();
        assert_eq!(bytes, b"add 1 1 ");

        let decoded = ProcedurePacket::<(i32, i32)>::decode(&bytes).unwrap();
        assert_eq!(decoded.name, "add");
        assert_eq!(decoded.args, (1, 1));
    }

    #[test]
    fn peek_name_leaves_args_untouched() {
        let packet = ProcedurePacket::new("twoSum", (vec![2i64, 7, 11, 15], 9i64));
        let bytes = packet.encode();
        let (name, mut rest) = peek_name(&bytes).unwrap();
        assert_eq!(name, "twoSum");
        let args = <(Vec<i64>, i64)>::decode_args(&mut rest).unwrap();
        assert_eq!(args, (vec![2, 7, 11, 15], 9));
    }

    #[test]
    fn return_packet_round_trips_on_success() {
        let packet = ReturnPacket::success(2i32);
        let bytes = encode_return(packet.code, &{
            let mut inner = Vec::new();
            2i32.encode(&mut inner);
            inner
        });
        let decoded = ReturnPacket::<i32>::decode(&bytes).unwrap();
        assert_eq!(decoded.code, StatusCode::Success);
        assert_eq!(decoded.into_success(), Some(2));
    }

    #[test]
    fn return_packet_failure_has_no_payload() {
        let bytes = encode_return(StatusCode::NoSuchProcedure, &[]);
        let decoded = ReturnPacket::<i32>::decode(&bytes).unwrap();
        assert_eq!(decoded.code, StatusCode::NoSuchProcedure);
        assert_eq!(decoded.into_success(), None);
    }

    #[test]
    fn rejects_procedure_names_with_spaces() {
        assert!(validate_procedure_name("bad name").is_err());
        assert!(validate_procedure_name("").is_err());
        assert!(validate_procedure_name("ok_name").is_ok());
    }
}
