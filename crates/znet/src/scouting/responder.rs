// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background thread answering scout messages with a [`Hello`].

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::socket;
use super::wire::{self, ScoutingMessage};
use crate::config::{Properties, SessionConfig};
use crate::error::{Error, Result};
use crate::types::Hello;

/// How often the responder loop re-checks its stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_DATAGRAM: usize = 1500;

/// Answers scout messages whose `what` mask includes the local entity kind.
///
/// Stops (and joins its thread) when dropped.
pub struct ScoutResponder {
    local_addr: SocketAddr,
    stop_flag: Arc<AtomicBool>,
    answered: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl ScoutResponder {
    /// Listen on the configured scouting address and answer with `hello`.
    pub fn spawn(properties: &Properties, hello: Hello) -> Result<Self> {
        let config = SessionConfig::from_properties(properties)?;
        let socket = socket::listen_socket(&config.multicast_address, &config.multicast_interface)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let answered = Arc::new(AtomicU64::new(0));
        let stop_clone = Arc::clone(&stop_flag);
        let answered_clone = Arc::clone(&answered);

        let handle = thread::Builder::new()
            .name("znet-scout-responder".to_string())
            .spawn(move || responder_loop(socket, hello, stop_clone, answered_clone))
            .map_err(Error::IoError)?;

        log::debug!("[SCOUT] Responder listening on {}", local_addr);
        Ok(Self {
            local_addr,
            stop_flag,
            answered,
            handle: Some(handle),
        })
    }

    /// Address the responder is bound to (resolves an ephemeral port).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of scout messages answered so far.
    pub fn answered(&self) -> u64 {
        self.answered.load(Ordering::Relaxed)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ScoutResponder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn responder_loop(
    socket: UdpSocket,
    hello: Hello,
    stop_flag: Arc<AtomicBool>,
    answered: Arc<AtomicU64>,
) {
    let mut buf = [0u8; MAX_DATAGRAM];
    let anonymous = Hello {
        pid: None,
        ..hello.clone()
    };

    while !stop_flag.load(Ordering::Relaxed) {
        let Some((len, from)) = receive(&socket, &mut buf) else {
            continue;
        };

        match wire::decode(&buf[..len]) {
            Ok(ScoutingMessage::Scout { what, pid_request }) => {
                if !what.intersects(hello.whatami) {
                    log::trace!("[SCOUT] Ignoring scout for {} from {}", what, from);
                    continue;
                }
                let reply = if pid_request { &hello } else { &anonymous };
                match socket.send_to(&wire::encode_hello(reply), from) {
                    Ok(_) => {
                        answered.fetch_add(1, Ordering::Relaxed);
                        log::debug!("[SCOUT] Answered scout from {}", from);
                    }
                    Err(e) => log::debug!("[SCOUT] Failed to answer {}: {}", from, e),
                }
            }
            Ok(ScoutingMessage::Hello(_)) => {}
            Err(e) => log::debug!("[SCOUT] Dropping datagram from {}: {}", from, e),
        }
    }
}

/// One receive attempt. Errors other than a timeout back off for
/// `POLL_INTERVAL` so a persistently failing socket does not spin.
fn receive(socket: &UdpSocket, buf: &mut [u8]) -> Option<(usize, SocketAddr)> {
    match socket.recv_from(buf) {
        Ok(received) => Some(received),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => None,
        Err(e) => {
            log::warn!("[SCOUT] Responder receive failed: {}", e);
            thread::sleep(POLL_INTERVAL);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_receive_timeout_returns_without_backoff() {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind");
        socket
            .set_read_timeout(Some(Duration::from_millis(5)))
            .expect("timeout");
        let mut buf = [0u8; MAX_DATAGRAM];

        let started = Instant::now();
        assert!(receive(&socket, &mut buf).is_none());
        assert!(started.elapsed() < POLL_INTERVAL);
    }

    #[test]
    fn test_receive_delivers_datagram() {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind");
        socket.set_read_timeout(Some(POLL_INTERVAL)).expect("timeout");
        let sender = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
        sender
            .send_to(b"hi", socket.local_addr().expect("addr"))
            .expect("send");
        let mut buf = [0u8; MAX_DATAGRAM];

        let (len, from) = receive(&socket, &mut buf).expect("datagram");
        assert_eq!(&buf[..len], b"hi");
        assert_eq!(from, sender.local_addr().expect("sender addr"));
    }

    // Linux reports ICMP port unreachable on the next receive of a connected socket.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_receive_error_backs_off() {
        let closed = UdpSocket::bind("127.0.0.1:0")
            .expect("bind")
            .local_addr()
            .expect("addr");
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind");
        socket.connect(closed).expect("connect");
        socket
            .set_read_timeout(Some(Duration::from_millis(5)))
            .expect("timeout");
        socket.send(b"scout").expect("send");
        thread::sleep(Duration::from_millis(50));
        let mut buf = [0u8; MAX_DATAGRAM];

        let started = Instant::now();
        assert!(receive(&socket, &mut buf).is_none());
        assert!(
            started.elapsed() >= POLL_INTERVAL,
            "hard receive error returned after {:?}",
            started.elapsed()
        );
    }
}
