use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("datagram of {0} bytes is shorter than a DNS header")]
    Truncated(usize),
    #[error("unable to parse DNS header: {0}")]
    Header(String),
}
