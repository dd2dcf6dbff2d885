// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Length-prefixed frame transport.
//!
//! Every application message is `4 bytes big-endian length L | L bytes
//! payload`. [`send_frame`]/[`recv_frame`] are the blocking form used by the
//! client and by tests; [`FrameReader`] is the incremental form the worker
//! reactor drives from non-blocking sockets, one readiness wakeup at a time.

use std::io::{self, Read, Write};

use crate::error::FrameError;

/// Writes one frame, retrying partial writes until the whole buffer leaves
/// or an I/O error occurs.
pub fn send_frame<W: Write>(stream: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).expect("frame payload exceeds u32::MAX bytes");
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(payload)?;
    Ok(())
}

/// Reads one frame, looping to cover partial reads of both the header and
/// the body. A clean EOF while reading the header is
/// [`FrameError::PeerClosed`]; an EOF mid-body is [`FrameError::Protocol`]
/// (a truncated frame).
pub fn recv_frame<R: Read>(stream: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut header = [0u8; 4];
    read_exact_or(stream, &mut header, FrameError::PeerClosed)?;
    let len = u32::from_be_bytes(header) as usize;

    let mut body = vec![0u8; len];
    read_exact_or(stream, &mut body, FrameError::Protocol)?;
    Ok(body)
}

/// Like [`Read::read_exact`], but distinguishes "zero bytes read before
/// anything else" (clean close, reported as `on_empty`) from "some bytes
/// read, then EOF" (a truncated frame, always `Protocol`).
fn read_exact_or<R: Read>(
    stream: &mut R,
    buf: &mut [u8],
    on_empty: FrameError,
) -> Result<(), FrameError> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(if filled == 0 {
                    on_empty
                } else {
                    FrameError::Protocol
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
    Ok(())
}

/// Incremental frame assembly for a non-blocking socket driven by readiness
/// notifications: each call to [`FrameReader::read_ready`] reads
/// as much as is currently available, looping within the current wakeup, and
/// yields every frame that became complete in the process, reading the
/// declared payload by looping within the current wakeup.
pub struct FrameReader {
    header: [u8; 4],
    header_filled: usize,
    body: Vec<u8>,
    body_filled: usize,
    reading_body: bool,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            header: [0; 4],
            header_filled: 0,
            body: Vec::new(),
            body_filled: 0,
            reading_body: false,
        }
    }

    /// Pulls every frame that can currently be assembled from `stream`
    /// without blocking. Returns `Ok(ReadOutcome)` describing whether the
    /// peer closed the connection (on a frame boundary); would-block simply
    /// stops the loop with whatever was assembled so far.
    pub fn read_ready<S: Read>(
        &mut self,
        stream: &mut S,
        mut on_frame: impl FnMut(Vec<u8>),
    ) -> Result<ReadOutcome, FrameError> {
        loop {
            if !self.reading_body {
                match self.fill(stream, true)? {
                    FillResult::WouldBlock => return Ok(ReadOutcome::WouldBlock),
                    FillResult::Closed => return Ok(ReadOutcome::PeerClosed),
                    FillResult::Filled => {
                        let len = u32::from_be_bytes(self.header) as usize;
                        self.body = vec![0; len];
                        self.body_filled = 0;
                        self.reading_body = true;
                    }
                }
            } else {
                match self.fill(stream, false)? {
                    FillResult::WouldBlock => return Ok(ReadOutcome::WouldBlock),
                    FillResult::Closed => return Err(FrameError::Protocol),
                    FillResult::Filled => {
                        let frame = std::mem::take(&mut self.body);
                        self.reading_body = false;
                        self.header_filled = 0;
                        on_frame(frame);
                    }
                }
            }
        }
    }

    fn fill<S: Read>(&mut self, stream: &mut S, is_header: bool) -> Result<FillResult, FrameError> {
        loop {
            let (buf, filled): (&mut [u8], &mut usize) = if is_header {
                (&mut self.header, &mut self.header_filled)
            } else {
                (&mut self.body, &mut self.body_filled)
            };

            if *filled == buf.len() {
                return Ok(FillResult::Filled);
            }

            match stream.read(&mut buf[*filled..]) {
                Ok(0) => return Ok(FillResult::Closed),
                Ok(n) => {
                    *filled += n;
                    if *filled == buf.len() {
                        return Ok(FillResult::Filled);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FillResult::WouldBlock)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FrameError::Io(e)),
            }
        }
    }
}

enum FillResult {
    Filled,
    WouldBlock,
    Closed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// No more data is currently available; call again after the next
    /// readiness notification.
    WouldBlock,
    /// The peer closed the connection cleanly on a frame boundary.
    PeerClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn send_then_recv_round_trips() {
        let mut buf = Vec::new();
        send_frame(&mut buf, b"hello").unwrap();
        assert_eq!(&buf[..4], &5u32.to_be_bytes());

        let mut cursor = Cursor::new(buf);
        let frame = recv_frame(&mut cursor).unwrap();
        assert_eq!(frame, b"hello");
    }

    #[test]
    fn empty_payload_round_trips() {
        let mut buf = Vec::new();
        send_frame(&mut buf, b"").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(recv_frame(&mut cursor).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn clean_eof_before_header_is_peer_closed() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(matches!(
            recv_frame(&mut cursor),
            Err(FrameError::PeerClosed)
        ));
    }

    #[test]
    fn eof_mid_body_is_protocol_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(b"short");
        let mut cursor = Cursor::new(buf);
        assert!(matches!(recv_frame(&mut cursor), Err(FrameError::Protocol)));
    }

    #[test]
    fn frame_reader_assembles_frame_split_across_several_reads() {
        let mut full = Vec::new();
        send_frame(&mut full, b"abcdef").unwrap();

        // Feed the bytes in small, irregular chunks.
        struct Chunked<'a> {
            data: &'a [u8],
            pos: usize,
            chunk: usize,
        }
        impl Read for Chunked<'_> {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.pos >= self.data.len() {
                    return Err(io::Error::from(io::ErrorKind::WouldBlock));
                }
                let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
                buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
                self.pos += n;
                Ok(n)
            }
        }

        let mut stream = Chunked {
            data: &full,
            pos: 0,
            chunk: 3,
        };
        let mut reader = FrameReader::new();
        let mut got = Vec::new();
        let outcome = reader
            .read_ready(&mut stream, |frame| got.push(frame))
            .unwrap();
        assert_eq!(outcome, ReadOutcome::WouldBlock);
        assert_eq!(got, vec![b"abcdef".to_vec()]);
    }
}
