use std::net::Ipv4Addr;
use typed_builder::TypedBuilder;

// The header contains the following fields:
//                                  1  1  1  1  1  1
//    0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                      ID                       |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    QDCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    ANCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    NSCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    ARCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct DnsHeader {
    // Opaque identifier chosen by the client. Responses echo it verbatim so the client can pair
    // them with the query it sent.
    pub id: u16,

    // 0 for queries, 1 for responses.
    #[builder(default = false)]
    pub response: bool,

    // A four bit field that specifies kind of query in this message.
    // 0     a standard query (QUERY)
    // 1     an inverse query (IQUERY)
    // 2     a server status request (STATUS)
    // 3-15  reserved for future use
    #[builder(default = 0)]
    pub opcode: u8,
    // Authoritative Answer - the responding name server is an authority for the domain name in
    // question section.
    #[builder(default = false)]
    pub authoritative_answer: bool,
    // TrunCation - this message was truncated due to length greater than that permitted on the
    // transmission channel.
    #[builder(default = false)]
    pub truncated_message: bool,
    // Recursion Desired - set in a query and copied into the response.
    #[builder(default = false)]
    pub recursion_desired: bool,

    // Recursion Available - whether recursive query support is available in the name server.
    #[builder(default = false)]
    pub recursion_available: bool,
    #[builder(default = false)]
    pub z: bool,
    #[builder(default = false)]
    pub authed_data: bool,
    #[builder(default = false)]
    pub checking_disabled: bool,
    #[builder(default = ResponseCode::NOERROR)]
    pub rescode: ResponseCode, // 4 bits

    // QDCOUNT
    #[builder(default = 0)]
    pub questions: u16,
    // ANCOUNT
    #[builder(default = 0)]
    pub answers: u16,
    // NSCOUNT
    #[builder(default = 0)]
    pub authoritative_entries: u16,
    // ARCOUNT
    #[builder(default = 0)]
    pub resource_entries: u16,
}

impl DnsHeader {
    pub fn flags(&self) -> u16 {
        (self.rescode as u16)
            | ((self.checking_disabled as u16) << 4)
            | ((self.authed_data as u16) << 5)
            | ((self.z as u16) << 6)
            | ((self.recursion_available as u16) << 7)
            | ((self.recursion_desired as u16) << 8)
            | ((self.truncated_message as u16) << 9)
            | ((self.authoritative_answer as u16) << 10)
            | ((self.opcode as u16) << 11)
            | ((self.response as u16) << 15)
    }

    /// Header of the reply to this query: authoritative, never truncated, RD copied, the
    /// question count kept and both the authority and additional sections empty.
    pub fn reply(&self, rescode: ResponseCode, answers: u16) -> DnsHeader {
        DnsHeader::builder()
            .id(self.id)
            .response(true)
            .authoritative_answer(true)
            .recursion_desired(self.recursion_desired)
            .rescode(rescode)
            .questions(self.questions)
            .answers(answers)
            .build()
    }

    /// Number of resource records following the question section.
    pub fn trailing_records(&self) -> usize {
        self.answers as usize + self.authoritative_entries as usize + self.resource_entries as usize
    }
}

//  Response code - this 4 bit field is set as part of responses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    // No error condition
    NOERROR = 0,
    // Format error - The name server was unable to interpret the query.
    FORMERR = 1,
    // Server failure - The name server was unable to process this query due to a problem with the
    // name server.
    SERVFAIL = 2,
    // Name Error - the domain name referenced in the query does not exist.
    NXDOMAIN = 3,
    // Not Implemented - The name server does not support the requested kind of query.
    NOTIMP = 4,
    // Refused - The name server refuses to perform the specified operation for policy reasons.
    REFUSED = 5,
    //  6-15  Reserved for future use.
}

impl ResponseCode {
    pub fn from_num(num: u8) -> ResponseCode {
        match num {
            1 => ResponseCode::FORMERR,
            2 => ResponseCode::SERVFAIL,
            3 => ResponseCode::NXDOMAIN,
            4 => ResponseCode::NOTIMP,
            5 => ResponseCode::REFUSED,
            _ => ResponseCode::NOERROR,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
pub enum QueryType {
    UNKNOWN(u16),
    A,
    CNAME,
    NS,
    MX,
    AAAA,
    // EDNS0 pseudo-record, only ever found in the additional section
    OPT,
}

impl QueryType {
    pub fn to_num(self) -> u16 {
        match self {
            QueryType::UNKNOWN(x) => x,
            QueryType::A => 1,
            QueryType::CNAME => 5,
            QueryType::NS => 2,
            QueryType::MX => 15,
            QueryType::AAAA => 28,
            QueryType::OPT => 41,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::NS,
            5 => QueryType::CNAME,
            15 => QueryType::MX,
            28 => QueryType::AAAA,
            41 => QueryType::OPT,
            _ => QueryType::UNKNOWN(num),
        }
    }
}

/// Dotted form of the first question's name.
///
/// `complete` is false when the label walk stopped early on a malformed label, in which case
/// `name` holds whatever labels were read before that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionName {
    pub name: String,
    pub complete: bool,
}

/// Type, class and RDATA size of a resource record that trailed the questions of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSummary {
    pub rtype: QueryType,
    // For OPT records this carries the requester's UDP payload size.
    pub class: u16,
    pub rdata_len: u16,
}

impl RecordSummary {
    pub fn is_opt(&self) -> bool {
        self.rtype == QueryType::OPT
    }
}

/// A decoded inbound query. Borrows the datagram it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuery<'a> {
    pub header: DnsHeader,
    pub question: QuestionName,
    // Type of the first question, when its fixed fields could be read.
    pub qtype: Option<QueryType>,
    // Bytes echoed back after the response header.
    pub question_section: &'a [u8],
    // Records after the question section. Responses never carry them.
    pub dropped: Vec<RecordSummary>,
    // Set when the question section could not be delimited and `question_section` is every byte
    // past the header.
    pub degraded: bool,
}

impl<'a> DnsQuery<'a> {
    pub fn name(&self) -> &str {
        &self.question.name
    }

    pub fn is_standard_query(&self) -> bool {
        self.header.opcode == 0
    }

    /// Whether the echoed section starts with a name an answer can point back at: a label or
    /// the root.
    pub fn has_question(&self) -> bool {
        match self.question_section.first() {
            Some(len) => *len <= 0x3f,
            None => false,
        }
    }
}

/// Everything the writer needs to put a response on the wire.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct DnsResponse<'a> {
    pub header: DnsHeader,
    pub question_section: &'a [u8],
    #[builder(default)]
    pub answer: Option<Ipv4Addr>,
}

impl<'a> DnsResponse<'a> {
    /// Reply to `query` echoing `question_section`. ANCOUNT follows from whether an address is
    /// given.
    pub fn reply(
        query: &DnsHeader,
        rescode: ResponseCode,
        question_section: &'a [u8],
        answer: Option<Ipv4Addr>,
    ) -> DnsResponse<'a> {
        let header = query.reply(rescode, answer.is_some() as u16);

        DnsResponse::builder()
            .header(header)
            .question_section(question_section)
            .answer(answer)
            .build()
    }
}
