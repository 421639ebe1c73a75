use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};

use crate::{error::ServerError, Responder, MAX_PACKET_SIZE};

// How long a receive may block before the stop signal is checked again.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Asks a running server loop to return. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> StopSignal {
        StopSignal::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct DnsServer {
    socket: UdpSocket,
    responder: Responder,
    stop: StopSignal,
}

impl DnsServer {
    pub fn bind<A: Into<SocketAddr>>(addr: A, responder: Responder) -> Result<DnsServer, ServerError> {
        let addr = addr.into();
        let socket = UdpSocket::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;

        Ok(DnsServer {
            socket,
            responder,
            stop: StopSignal::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Receives, answers and sends one datagram at a time until the stop signal is raised.
    pub fn run(&self) {
        let config = self.responder.config();
        match config.hostname() {
            Some(hostname) if !config.answer_all() => {
                info!("Only answering {} with {}", hostname, config.answer_addr())
            }
            _ => info!("Answering all A questions with {}", config.answer_addr()),
        }

        match self.socket.local_addr() {
            Ok(addr) => info!("DNS Server listening on {}/udp", addr),
            Err(e) => warn!("DNS Server listening on an unknown address: {}", e),
        }

        // One spare byte tells an oversized datagram apart from one that fits exactly.
        let mut request = [0u8; MAX_PACKET_SIZE + 1];
        let mut response = [0u8; MAX_PACKET_SIZE];

        while !self.stop.is_stopped() {
            let (size, source) = match self.socket.recv_from(&mut request) {
                Ok(received) => received,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(e) => {
                    debug!("Failed to receive datagram: {}", e);
                    continue;
                }
            };

            if size == 0 {
                continue;
            }

            if size > MAX_PACKET_SIZE {
                warn!(
                    "Dropping datagram from {}: larger than {} bytes",
                    source, MAX_PACKET_SIZE
                );
                continue;
            }

            match self.responder.respond(&request[..size], &mut response) {
                Ok(Some(len)) => {
                    if let Err(e) = self.socket.send_to(&response[..len], source) {
                        error!("sendto {} failed: {}", source, e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Unable to build response for {}: {:?}", source, e),
            }
        }

        info!("DNS Server stopped");
    }

    /// Runs the server loop on its own thread.
    pub fn spawn(self) -> Result<ServerHandle, ServerError> {
        let stop = self.stop_signal();
        let handle = thread::Builder::new()
            .name("dns-server".to_string())
            .spawn(move || self.run())?;

        Ok(ServerHandle { stop, handle })
    }
}

pub struct ServerHandle {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Raises the stop signal and waits for the loop to finish.
    pub fn stop(self) -> Result<(), ServerError> {
        self.stop.stop();
        self.join()
    }

    pub fn join(self) -> Result<(), ServerError> {
        self.handle.join().map_err(|_| ServerError::Panicked)
    }
}
