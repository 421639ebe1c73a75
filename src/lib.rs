mod config;
mod error;
mod policy;
mod server;

pub use config::{Config, Hostname};
pub use dnsparse::{
    parse_query, write_response, DnsHeader, DnsQuery, DnsResponse, QueryType, ResponseCode,
};
pub use error::{ConfigError, ServerError};
pub use policy::{evaluate, Decision, OpcodeFilter};
pub use server::{DnsServer, ServerHandle, StopSignal};

use dnsparse::strip_legacy_opt;
use log::{debug, trace, warn};

pub const MAX_PACKET_SIZE: usize = 512;
pub const DNS_PORT: u16 = 53;

/// Turns one query datagram into one response datagram. Holds no state between requests.
#[derive(Clone, Debug)]
pub struct Responder {
    config: Config,
}

impl Responder {
    pub fn new(config: Config) -> Result<Responder, ConfigError> {
        config.validate()?;

        Ok(Responder { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Writes the response to `datagram` into `out`, returning its length, or `None` when the
    /// datagram gets no response at all.
    pub fn respond(&self, datagram: &[u8], out: &mut [u8]) -> anyhow::Result<Option<usize>> {
        let query = match parse_query(datagram) {
            Ok(query) => query,
            Err(e) => {
                debug!("Ignoring datagram: {}", e);
                return Ok(None);
            }
        };

        if query.degraded {
            warn!(
                "malformed DNS request {:#06x}, matching on {:?}",
                query.header.id,
                query.name()
            );
        }

        for record in &query.dropped {
            if record.is_opt() {
                trace!("Dropping EDNS0 OPT record (udp payload {})", record.class);
            } else {
                debug!("Dropping {:?} record trailing the question", record.rtype);
            }
        }

        let decision = evaluate(&query, &self.config);
        debug!(
            "{:#06x} {:?} ({:?}): {:?}",
            query.header.id,
            query.name(),
            query.qtype,
            decision
        );

        let response = match decision {
            Decision::Answer => {
                let question_section = if query.degraded {
                    strip_legacy_opt(query.question_section)
                } else {
                    query.question_section
                };

                DnsResponse::reply(
                    &query.header,
                    decision.rescode(),
                    question_section,
                    Some(self.config.answer_addr()),
                )
            }
            Decision::Refused | Decision::NotImplemented => DnsResponse::reply(
                &query.header,
                decision.rescode(),
                query.question_section,
                None,
            ),
        };

        let size = write_response(out, &response)?;

        Ok(Some(size))
    }
}
