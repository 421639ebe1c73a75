mod error;
mod parser;
mod types;
mod writer;

pub use error::DecodeError;
pub use types::{
    DnsHeader, DnsQuery, DnsResponse, QueryType, QuestionName, RecordSummary, ResponseCode,
};

pub use parser::{query as parse_query, strip_legacy_opt, HEADER_LEN, MAX_NAME_LEN};
pub use writer::{write as write_response, ANSWER_LEN, ANSWER_TTL};
