use dnsparse::{DnsQuery, ResponseCode};

use crate::config::Config;

/// Which opcodes are turned away with NOTIMP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpcodeFilter {
    /// Every opcode is handled like a standard query; NOTIMP is never sent.
    Legacy,
    /// Any opcode other than QUERY (0) gets NOTIMP.
    StandardOnly,
}

impl OpcodeFilter {
    fn rejects(self, query: &DnsQuery) -> bool {
        match self {
            OpcodeFilter::Legacy => false,
            OpcodeFilter::StandardOnly => !query.is_standard_query(),
        }
    }
}

impl Default for OpcodeFilter {
    fn default() -> Self {
        OpcodeFilter::Legacy
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Answer,
    Refused,
    NotImplemented,
}

impl Decision {
    pub fn rescode(self) -> ResponseCode {
        match self {
            Decision::Answer => ResponseCode::NOERROR,
            Decision::Refused => ResponseCode::REFUSED,
            Decision::NotImplemented => ResponseCode::NOTIMP,
        }
    }
}

/// First match wins: unsupported opcode, then a name other than the configured one, then answer.
/// Only the first question is looked at, and a query without one is refused even when answering
/// everything.
pub fn evaluate(query: &DnsQuery, config: &Config) -> Decision {
    if config.opcode_filter().rejects(query) {
        return Decision::NotImplemented;
    }

    if !query.has_question() {
        return Decision::Refused;
    }

    if !config.answer_all() && !config.matches(query.name()) {
        return Decision::Refused;
    }

    Decision::Answer
}
