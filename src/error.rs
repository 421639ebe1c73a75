use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("a hostname is required unless every query is answered")]
    MissingHostname,
    #[error("hostname {0:?} is empty or contains an empty label")]
    EmptyLabel(String),
    #[error("hostname {name:?} is {len} bytes long, at most {max} bytes can be matched")]
    HostnameTooLong { name: String, len: usize, max: usize },
    #[error("cannot answer queries with the unspecified address {0}")]
    UnspecifiedAddress(Ipv4Addr),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}/udp: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),
    #[error("DNS server thread panicked")]
    Panicked,
}
