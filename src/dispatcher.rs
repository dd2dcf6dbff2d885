// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The dispatch & typed-invocation engine: a name → type-erased handler
//! registry, and `handle(bytes) -> bytes`.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::*;

use crate::codec::Encode;
use crate::error::DecodeError;
use crate::packet::{encode_return, peek_name, validate_procedure_name, ArgsDecode, StatusCode};

/// A type-erased procedure implementation: given the still-encoded argument
/// tuple, decode it, invoke the underlying callable, and return the encoded
/// result. `Err` means the arguments didn't decode against this handler's
/// declared signature.
type HandlerFn = dyn Fn(&[u8]) -> Result<Vec<u8>, DecodeError> + Send + Sync;

/// A registry of named procedures. Built up with [`Dispatcher::register`]/
/// [`Dispatcher::register_method`] during server initialization, then
/// treated as read-only: `handle` takes `&self` and needs no lock.
pub struct Dispatcher {
    procedures: HashMap<String, Box<HandlerFn>>,
    critical_time: Option<Duration>,
    sealed: bool,
}

impl Dispatcher {
    /// `critical_time_ms < 0` disables the slow-handler warning.
    pub fn new(critical_time_ms: i64) -> Self {
        Self {
            procedures: HashMap::new(),
            critical_time: (critical_time_ms >= 0)
                .then(|| Duration::from_millis(critical_time_ms as u64)),
            sealed: false,
        }
    }

    /// Registers a free function or closure under `name`. Two registrations
    /// sharing a name: last write wins — callers are expected to avoid
    /// collisions.
    pub fn register<Args, R, F>(&mut self, name: &str, procedure: F)
    where
        Args: ArgsDecode,
        R: Encode,
        F: Fn(Args) -> R + Send + Sync + 'static,
    {
        self.register_raw(name, move |arg_bytes| {
            let mut rest = arg_bytes;
            let args = Args::decode_args(&mut rest)?;
            let result = procedure(args);
            let mut buf = Vec::new();
            result.encode(&mut buf);
            Ok(buf)
        });
    }

    /// Registers a method to be invoked on a long-lived receiver shared
    /// across calls. The receiver is serialized across concurrent invocations by the
    /// mutex; procedures that need finer-grained sharing should hold their
    /// own interior mutability instead.
    pub fn register_method<T, Args, R, F>(&mut self, name: &str, receiver: Arc<Mutex<T>>, method: F)
    where
        T: Send + 'static,
        Args: ArgsDecode,
        R: Encode,
        F: Fn(&mut T, Args) -> R + Send + Sync + 'static,
    {
        self.register_raw(name, move |arg_bytes| {
            let mut rest = arg_bytes;
            let args = Args::decode_args(&mut rest)?;
            let mut guard = receiver.lock().expect("receiver mutex poisoned");
            let result = method(&mut guard, args);
            let mut buf = Vec::new();
            result.encode(&mut buf);
            Ok(buf)
        });
    }

    fn register_raw(
        &mut self,
        name: &str,
        handler: impl Fn(&[u8]) -> Result<Vec<u8>, DecodeError> + Send + Sync + 'static,
    ) {
        assert!(
            !self.sealed,
            "cannot register procedure '{name}' after the server has started"
        );
        validate_procedure_name(name).expect("invalid procedure name");
        info!("registering procedure '{name}'");
        self.procedures.insert(name.to_string(), Box::new(handler));
    }

    /// Marks the registry read-only. Called once by the server before the
    /// reactor starts accepting connections; registering a procedure after
    /// this point is a programming error.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Decodes the procedure name, looks it up, invokes the handler, and
    /// encodes a full return packet.
    ///
    /// Never panics: a panicking or name-decode-failing request degrades to
    /// `UNKNOWN`, and an unregistered name becomes `NO_SUCH_PROCEDURE` —
    /// both logged, neither propagated to the caller.
    pub fn handle(&self, request: &[u8]) -> Vec<u8> {
        let (name, rest) = match peek_name(request) {
            Ok(v) => v,
            Err(e) => {
                error!("failed to decode procedure name: {e}");
                return encode_return(StatusCode::Unknown, &[]);
            }
        };

        let Some(handler) = self.procedures.get(&name) else {
            warn!("no such procedure: '{name}'");
            return encode_return(StatusCode::NoSuchProcedure, &[]);
        };

        let start = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(rest)));
        let elapsed = start.elapsed();

        if let Some(threshold) = self.critical_time {
            if elapsed >= threshold {
                warn!("procedure '{name}' exceeded critical time: ran for {elapsed:?}");
            }
        }

        match outcome {
            Ok(Ok(payload)) => encode_return(StatusCode::Success, &payload),
            Ok(Err(e)) => {
                error!("procedure '{name}' failed to decode its arguments: {e}");
                encode_return(StatusCode::Unknown, &[])
            }
            Err(panic) => {
                error!(
                    "procedure '{name}' panicked: {}",
                    panic_message(panic.as_ref())
                );
                encode_return(StatusCode::Unknown, &[])
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{decode_return_raw, ProcedurePacket};

    fn add(args: (i32, i32)) -> i32 {
        args.0 + args.1
    }

    #[test]
    fn dispatches_to_registered_procedure() {
        let mut dispatcher = Dispatcher::new(3000);
        dispatcher.register("add", add);
        dispatcher.seal();

        let request = ProcedurePacket::new("add", (1i32, 1i32)).encode();
        let response = dispatcher.handle(&request);

        let raw = decode_return_raw(&response).unwrap();
        assert_eq!(raw.code, StatusCode::Success);
        let mut payload = raw.payload;
        assert_eq!(i32::decode(&mut payload).unwrap(), 2);
    }

    #[test]
    fn unknown_procedure_never_invokes_a_handler() {
        let mut dispatcher = Dispatcher::new(3000);
        dispatcher.register("add", add);
        dispatcher.seal();

        let request = ProcedurePacket::new("niubi", ()).encode();
        let response = dispatcher.handle(&request);
        let raw = decode_return_raw(&response).unwrap();
        assert_eq!(raw.code, StatusCode::NoSuchProcedure);
    }

    #[test]
    fn panicking_handler_degrades_to_unknown_and_does_not_unwind() {
        let mut dispatcher = Dispatcher::new(3000);
        dispatcher.register("excp", |_: ()| -> i32 { panic!("boom") });
        dispatcher.seal();

        let request = ProcedurePacket::new("excp", ()).encode();
        let response = dispatcher.handle(&request);
        let raw = decode_return_raw(&response).unwrap();
        assert_eq!(raw.code, StatusCode::Unknown);
    }

    #[test]
    fn mismatched_argument_types_degrade_to_unknown() {
        let mut dispatcher = Dispatcher::new(3000);
        dispatcher.register("add", add);
        dispatcher.seal();

        // "add" expects (i32, i32); send it a single string argument instead.
        let request = ProcedurePacket::new("add", ("oops".to_string(),)).encode();
        let response = dispatcher.handle(&request);
        let raw = decode_return_raw(&response).unwrap();
        assert_eq!(raw.code, StatusCode::Unknown);
    }

    #[test]
    #[should_panic(expected = "after the server has started")]
    fn registering_after_seal_panics() {
        let mut dispatcher = Dispatcher::new(3000);
        dispatcher.seal();
        dispatcher.register("add", add);
    }

    #[test]
    fn register_method_shares_state_across_calls() {
        let mut dispatcher = Dispatcher::new(3000);
        let counter = Arc::new(Mutex::new(0i32));
        dispatcher.register_method("incr", counter, |state, (delta,): (i32,)| {
            *state += delta;
            *state
        });
        dispatcher.seal();

        let first = dispatcher.handle(&ProcedurePacket::new("incr", (5i32,)).encode());
        let second = dispatcher.handle(&ProcedurePacket::new("incr", (5i32,)).encode());

        let mut p = decode_return_raw(&first).unwrap().payload;
        assert_eq!(i32::decode(&mut p).unwrap(), 5);
        let mut p = decode_return_raw(&second).unwrap().payload;
        assert_eq!(i32::decode(&mut p).unwrap(), 10);
    }
}
