//! Network listener: a receive thread feeding decoded messages to a handler.
//!
//! The socket uses a short read timeout so the thread notices the stop flag;
//! `close` sets the flag, joins the thread and drops the socket. Messages are
//! handled synchronously on the receive thread, one at a time.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{ConsoleError, ConsoleResult};
use crate::transport::decode_datagram;
use crate::MessageHandler;

/// How long a blocked read waits before re-checking the stop flag.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Largest UDP payload.
const MAX_DATAGRAM: usize = 65_536;

pub struct OscListener {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl OscListener {
    /// Bind `host:port` and start receiving.
    pub fn open(host: &str, port: u16, handler: MessageHandler) -> ConsoleResult<Self> {
        let addr = format!("{}:{}", host, port);
        let bind_err = |source| ConsoleError::Bind {
            addr: addr.clone(),
            source,
        };

        let socket = UdpSocket::bind(addr.as_str()).map_err(bind_err)?;
        socket
            .set_read_timeout(Some(RECV_POLL_INTERVAL))
            .map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let join_handle = thread::Builder::new()
            .name("osc-listener".into())
            .spawn(move || receive_loop(socket, thread_running, handler))?;

        log::info!(target: "listener", "listening on {}", local_addr);

        Ok(Self {
            local_addr,
            running,
            join_handle: Some(join_handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the receive thread and release the port.
    pub fn close(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(join) = self.join_handle.take() {
            if join.join().is_err() {
                log::error!(target: "listener", "receive thread panicked");
            }
            log::info!(target: "listener", "closed {}", self.local_addr);
        }
    }
}

impl Drop for OscListener {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_loop(socket: UdpSocket, running: Arc<AtomicBool>, handler: MessageHandler) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    while running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((n, src)) => match decode_datagram(&buf[..n], &src.to_string()) {
                Ok(records) => {
                    for record in &records {
                        handler(record, None);
                    }
                }
                Err(e) => {
                    log::warn!(target: "listener", "undecodable datagram from {}: {}", src, e);
                }
            },
            Err(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue
            }
            Err(e) => {
                log::error!(target: "listener", "receive failed: {}", e);
                break;
            }
        }
    }
    running.store(false, Ordering::Release);
}
