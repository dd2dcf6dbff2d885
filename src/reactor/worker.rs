// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! A worker reactor: owns a share of accepted connections, reassembles
//! frames off each one's readiness notifications, hands completed requests
//! to its own task executor, and writes replies back out as the socket
//! becomes writable.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::*;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token, Waker};

use super::shutdown_requested;
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::executor::Executor;
use crate::frame::{FrameReader, ReadOutcome};

const WAKE_TOKEN: Token = Token(usize::MAX);
const FIRST_CONNECTION_TOKEN: usize = 1;

/// The acceptor's handle onto one worker reactor: enough to hand it a new
/// connection and read its current load for least-loaded selection.
pub struct WorkerHandle {
    conn_sender: mpsc::Sender<TcpStream>,
    waker: Arc<Waker>,
    load: Arc<AtomicUsize>,
}

impl WorkerHandle {
    pub fn load(&self) -> usize {
        self.load.load(Ordering::Relaxed)
    }

    pub fn dispatch(&self, stream: TcpStream) {
        self.load.fetch_add(1, Ordering::Relaxed);
        if self.conn_sender.send(stream).is_err() {
            warn!("worker reactor is no longer accepting connections");
            return;
        }
        let _ = self.waker.wake();
    }
}

struct Connection {
    stream: TcpStream,
    reader: FrameReader,
    write_queue: VecDeque<Vec<u8>>,
    write_offset: usize,
    write_interest_armed: bool,
}

pub fn spawn(
    id: usize,
    config: &ServerConfig,
    dispatcher: Arc<Dispatcher>,
) -> io::Result<(WorkerHandle, JoinHandle<()>)> {
    let poll = Poll::new()?;
    let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
    let (conn_sender, conn_receiver) = mpsc::channel();
    let load = Arc::new(AtomicUsize::new(0));

    let handle = WorkerHandle {
        conn_sender,
        waker: Arc::clone(&waker),
        load: Arc::clone(&load),
    };

    let config = config.clone();
    let join = thread::Builder::new()
        .name(format!("rpc-worker-{id}"))
        .spawn(move || run_loop(id, config, dispatcher, poll, conn_receiver, load, waker))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok((handle, join))
}

fn run_loop(
    id: usize,
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    mut poll: Poll,
    conn_receiver: mpsc::Receiver<TcpStream>,
    load: Arc<AtomicUsize>,
    waker: Arc<Waker>,
) {
    let executor = Executor::new(config.task_thread_nums, config.task_queue_capacity);
    let (response_sender, response_receiver) = mpsc::channel::<(Token, Vec<u8>)>();

    let mut events = Events::with_capacity(config.epoll_buffer_size);
    let wait_timeout = Duration::from_millis(config.epoll_wait_time_ms);
    let mut connections: HashMap<Token, Connection> = HashMap::new();
    let mut next_token = FIRST_CONNECTION_TOKEN;

    while !shutdown_requested() {
        if let Err(e) = poll.poll(&mut events, Some(wait_timeout)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            error!("worker {id} poll failed: {e}");
            break;
        }

        let registry = poll.registry();

        for event in events.iter() {
            let token = event.token();
            if token == WAKE_TOKEN {
                continue;
            }

            let Some(conn) = connections.get_mut(&token) else {
                continue;
            };

            if event.is_readable() {
                match read_connection(id, token, conn, &dispatcher, &executor, &response_sender, &waker) {
                    Ok(ReadOutcome::WouldBlock) => {}
                    Ok(ReadOutcome::PeerClosed) => {
                        close_connection(registry, &mut connections, token, &load);
                        continue;
                    }
                    Err(e) => {
                        debug!("worker {id} closing connection {token:?} after frame error: {e}");
                        close_connection(registry, &mut connections, token, &load);
                        continue;
                    }
                }
            }

            if event.is_writable() {
                if let Some(conn) = connections.get_mut(&token) {
                    flush(registry, token, conn);
                }
            }
        }

        // Runs every wakeup, not only ones from `WAKE_TOKEN`: a readable
        // event and the task completion it queues can both land in the same
        // wakeup, and new connections/responses must never wait on a second
        // one to be noticed.
        admit_new_connections(registry, &conn_receiver, &mut connections, &mut next_token, id);
        deliver_responses(registry, &response_receiver, &mut connections);
    }

    executor.shutdown();
    info!("worker {id} shut down with {} connection(s) open", connections.len());
}

fn read_connection(
    id: usize,
    token: Token,
    conn: &mut Connection,
    dispatcher: &Arc<Dispatcher>,
    executor: &Executor,
    response_sender: &mpsc::Sender<(Token, Vec<u8>)>,
    waker: &Arc<Waker>,
) -> Result<ReadOutcome, crate::error::FrameError> {
    let key = token.0 as u64;
    let dispatcher = Arc::clone(dispatcher);
    let response_sender = response_sender.clone();
    let waker = Arc::clone(waker);

    conn.reader.read_ready(&mut conn.stream, move |frame| {
        let dispatcher = Arc::clone(&dispatcher);
        let response_sender = response_sender.clone();
        let waker = Arc::clone(&waker);
        if let Err(e) = executor.enqueue(key, move || {
            let response = dispatcher.handle(&frame);
            let _ = response_sender.send((token, response));
            let _ = waker.wake();
        }) {
            warn!("worker {id} dropped a request on {token:?}: {e}");
        }
    })
}

fn admit_new_connections(
    registry: &Registry,
    conn_receiver: &mpsc::Receiver<TcpStream>,
    connections: &mut HashMap<Token, Connection>,
    next_token: &mut usize,
    id: usize,
) {
    while let Ok(mut stream) = conn_receiver.try_recv() {
        let token = Token(*next_token);
        *next_token += 1;
        if let Err(e) = registry.register(&mut stream, token, Interest::READABLE) {
            warn!("worker {id} failed to register a new connection: {e}");
            continue;
        }
        connections.insert(
            token,
            Connection {
                stream,
                reader: FrameReader::new(),
                write_queue: VecDeque::new(),
                write_offset: 0,
                write_interest_armed: false,
            },
        );
    }
}

fn deliver_responses(
    registry: &Registry,
    response_receiver: &mpsc::Receiver<(Token, Vec<u8>)>,
    connections: &mut HashMap<Token, Connection>,
) {
    while let Ok((token, payload)) = response_receiver.try_recv() {
        let Some(conn) = connections.get_mut(&token) else {
            continue; // the connection closed before its reply was ready
        };
        conn.write_queue.push_back(frame_response(&payload));
        flush(registry, token, conn);
    }
}

/// Prepends the 4-byte big-endian length prefix `recv_frame` expects, the
/// same framing `send_frame` writes on the client side.
fn frame_response(payload: &[u8]) -> Vec<u8> {
    let len = u32::try_from(payload.len()).expect("response payload exceeds u32::MAX bytes");
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Writes as much of the pending queue as the socket will currently accept,
/// arming or disarming write readiness to match whether anything is left.
fn flush(registry: &Registry, token: Token, conn: &mut Connection) {
    loop {
        let Some(buf) = conn.write_queue.front() else {
            break;
        };
        match conn.stream.write(&buf[conn.write_offset..]) {
            Ok(0) => break,
            Ok(n) => {
                conn.write_offset += n;
                if conn.write_offset == buf.len() {
                    conn.write_queue.pop_front();
                    conn.write_offset = 0;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                arm_write_interest(registry, token, conn, true);
                return;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("write to {token:?} failed: {e}");
                return;
            }
        }
    }
    arm_write_interest(registry, token, conn, false);
}

fn arm_write_interest(registry: &Registry, token: Token, conn: &mut Connection, want_writable: bool) {
    if conn.write_interest_armed == want_writable {
        return;
    }
    conn.write_interest_armed = want_writable;
    let interest = if want_writable {
        Interest::READABLE | Interest::WRITABLE
    } else {
        Interest::READABLE
    };
    let _ = registry.reregister(&mut conn.stream, token, interest);
}

fn close_connection(
    registry: &Registry,
    connections: &mut HashMap<Token, Connection>,
    token: Token,
    load: &AtomicUsize,
) {
    if let Some(mut conn) = connections.remove(&token) {
        let _ = registry.deregister(&mut conn.stream);
        load.fetch_sub(1, Ordering::Relaxed);
    }
}
