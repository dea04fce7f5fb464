//! UDP listener for pushed (syslog-style) log lines.
//!
//! A background thread owns the socket and forwards every datagram into an
//! unbounded channel. Polling drains whatever was queued at call time.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use super::LineSource;
use crate::error::{Error, Result};

/// How often the listener wakes up to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Largest datagram accepted.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Strip surrounding whitespace and NUL padding from a received datagram.
pub fn decode_datagram(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Line source fed by a UDP listener thread.
pub struct SyslogListener {
    local_addr: SocketAddr,
    queue: Receiver<String>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SyslogListener {
    /// Bind `host:port` and start the listener thread.
    ///
    /// Failing to bind is fatal for the owning source.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let socket = UdpSocket::bind(&addr).map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;
        let local_addr = socket.local_addr().map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;
        socket
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(|source| Error::Bind {
                addr: addr.clone(),
                source,
            })?;

        let (tx, rx) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name(format!("syslog-{}", local_addr.port()))
            .spawn(move || listen(socket, tx, thread_stop))
            .map_err(|source| Error::Bind { addr, source })?;

        info!(%local_addr, "syslog listener started");
        Ok(Self {
            local_addr,
            queue: rx,
            stop,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the listener thread and release the socket.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::SeqCst);
        wake(self.local_addr);
        if handle.join().is_err() {
            warn!(local_addr = %self.local_addr, "syslog listener thread panicked");
        }
        debug!(local_addr = %self.local_addr, "syslog listener stopped");
    }
}

/// Send an empty datagram so a blocked `recv_from` returns promptly.
fn wake(addr: SocketAddr) {
    let target = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => (Ipv4Addr::LOCALHOST, addr.port()).into(),
        IpAddr::V6(ip) if ip.is_unspecified() => (Ipv6Addr::LOCALHOST, addr.port()).into(),
        _ => addr,
    };
    let bind = if target.is_ipv4() { "127.0.0.1:0" } else { "[::1]:0" };
    if let Ok(socket) = UdpSocket::bind(bind) {
        let _ = socket.send_to(&[], target);
    }
}

fn listen(socket: UdpSocket, tx: Sender<String>, stop: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while !stop.load(Ordering::SeqCst) {
        match socket.recv_from(&mut buf) {
            Ok((len, peer)) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let line = decode_datagram(&buf[..len]);
                debug!(%peer, len, "received datagram");
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "syslog receive failed");
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

impl LineSource for SyslogListener {
    fn pull_new_lines(&mut self) -> Vec<String> {
        // Only what is queued now; later arrivals wait for the next poll.
        let pending = self.queue.len();
        self.queue.try_iter().take(pending).collect()
    }

    fn describe(&self) -> String {
        format!("syslog://{}", self.local_addr)
    }
}

impl Drop for SyslogListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}
