// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The blocking client: one call in flight per connection, used exactly as
//! `RPCFramework::callProxy` is used on its client side — connect once, then
//! issue calls that each block until their reply arrives.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::codec::Decode;
use crate::error::ClientError;
use crate::frame::{recv_frame, send_frame};
use crate::packet::{ArgsEncode, ProcedurePacket, ReturnPacket, StatusCode};

/// A connected RPC client. Generic over the stream type so tests can drive
/// it over an in-memory pipe instead of a real socket.
pub struct Client<S> {
    stream: S,
}

impl Client<TcpStream> {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        // One call in flight per connection; Nagle's algorithm only adds
        // latency to that pattern.
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl<S: Read + Write> Client<S> {
    pub fn from_stream(stream: S) -> Self {
        Self { stream }
    }

    /// Sends `name(args)`, blocks for the reply, and decodes it as `R`.
    /// A non-success status code is reported as [`ClientError::Remote`]
    /// rather than any particular decoded value, since the payload is
    /// meaningless on failure.
    pub fn remote_call<Args, R>(&mut self, name: &str, args: Args) -> Result<R, ClientError>
    where
        Args: ArgsEncode,
        R: Decode,
    {
        let request = ProcedurePacket::new(name, args).encode();
        send_frame(&mut self.stream, &request)?;

        let response = recv_frame(&mut self.stream)?;
        let reply = ReturnPacket::<R>::decode(&response)?;
        match reply.code {
            StatusCode::Success => Ok(reply
                .into_success()
                .expect("a SUCCESS return packet always decodes a payload")),
            other => Err(ClientError::Remote(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use std::os::unix::net::UnixStream;

    #[test]
    fn remote_call_round_trips_over_a_pipe() {
        let (client_side, server_side) = UnixStream::pair().unwrap();

        let mut dispatcher = Dispatcher::new(3000);
        dispatcher.register("add", |(a, b): (i32, i32)| a + b);
        dispatcher.seal();

        let server = std::thread::spawn(move || {
            let mut server_side = server_side;
            let request = crate::frame::recv_frame(&mut server_side).unwrap();
            let response = dispatcher.handle(&request);
            crate::frame::send_frame(&mut server_side, &response).unwrap();
        });

        let mut client = Client::from_stream(client_side);
        let sum: i32 = client.remote_call("add", (1i32, 1i32)).unwrap();
        assert_eq!(sum, 2);

        server.join().unwrap();
    }

    #[test]
    fn remote_call_surfaces_no_such_procedure() {
        let (client_side, server_side) = UnixStream::pair().unwrap();

        let mut dispatcher = Dispatcher::new(3000);
        dispatcher.seal();

        let server = std::thread::spawn(move || {
            let mut server_side = server_side;
            let request = crate::frame::recv_frame(&mut server_side).unwrap();
            let response = dispatcher.handle(&request);
            crate::frame::send_frame(&mut server_side, &response).unwrap();
        });

        let mut client = Client::from_stream(client_side);
        let result: Result<i32, ClientError> = client.remote_call("niubi", ());
        assert!(matches!(result, Err(ClientError::Remote(StatusCode::NoSuchProcedure))));

        server.join().unwrap();
    }
}
