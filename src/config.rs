use std::{convert::TryFrom, fmt, net::Ipv4Addr, str::FromStr};

use dnsparse::MAX_NAME_LEN;
use typed_builder::TypedBuilder;

use crate::{error::ConfigError, policy::OpcodeFilter};

/// The single name answered when not answering everything.
///
/// Stored without a trailing dot so it compares directly against decoded question names, and
/// never longer than a decoded name can be.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Hostname(String);

impl Hostname {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Hostname {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let name = value.strip_suffix('.').unwrap_or(value);

        if name.is_empty() || name.split('.').any(str::is_empty) {
            return Err(ConfigError::EmptyLabel(value.to_string()));
        }

        if name.len() > MAX_NAME_LEN {
            return Err(ConfigError::HostnameTooLong {
                name: value.to_string(),
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }

        Ok(Hostname(name.to_string()))
    }
}

impl FromStr for Hostname {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hostname::try_from(s)
    }
}

impl fmt::Display for Hostname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the responder answers and with which address. Fixed once the server starts.
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct Config {
    #[builder(default)]
    hostname: Option<Hostname>,
    #[builder(default = false)]
    answer_all: bool,
    #[builder(default)]
    opcode_filter: OpcodeFilter,
    answer_addr: Ipv4Addr,
}

impl Config {
    pub fn hostname(&self) -> Option<&Hostname> {
        self.hostname.as_ref()
    }

    pub fn answer_all(&self) -> bool {
        self.answer_all
    }

    pub fn opcode_filter(&self) -> OpcodeFilter {
        self.opcode_filter
    }

    pub fn answer_addr(&self) -> Ipv4Addr {
        self.answer_addr
    }

    /// Exact, case-sensitive comparison against the configured hostname.
    pub fn matches(&self, name: &str) -> bool {
        self.hostname
            .as_ref()
            .map_or(false, |hostname| hostname.as_str() == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.answer_all && self.hostname.is_none() {
            return Err(ConfigError::MissingHostname);
        }

        if self.answer_addr.is_unspecified() {
            return Err(ConfigError::UnspecifiedAddress(self.answer_addr));
        }

        Ok(())
    }
}
