use log::{debug, trace};
use nom::{
    bytes::complete::take as take_bytes,
    error::{ErrorKind, ParseError},
    number::complete::{be_u16, be_u32, be_u8},
    IResult,
};

use crate::{
    error::DecodeError,
    types::{DnsHeader, DnsQuery, QueryType, QuestionName, RecordSummary, ResponseCode},
};

pub const HEADER_LEN: usize = 12;
// Longest dotted question name kept for matching; anything beyond is dropped.
pub const MAX_NAME_LEN: usize = 62;

const POINTER_FLAG: u8 = 0xc0;
const MAX_LABEL_LEN: u8 = 0x3f;
const NULL_BYTE: u8 = 0x00;

// Name (root), TYPE, CLASS, TTL and RDLENGTH of an OPT record without options.
const EMPTY_OPT_LEN: usize = 11;
const EMPTY_OPT_SIGNATURE: [u8; 3] = [0x00, 0x00, 0x29];

type Error<'a> = nom::error::Error<&'a [u8]>;

fn header<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], DnsHeader, E>
where
    E: ParseError<&'a [u8]>,
{
    |input| {
        // network order is big endian
        let (rest, id) = be_u16(input)?;

        let (rest, a) = be_u8(rest)?;
        let (rest, b) = be_u8(rest)?;

        let recursion_desired = (a & (1 << 0)) > 0;
        let truncated_message = (a & (1 << 1)) > 0;
        let authoritative_answer = (a & (1 << 2)) > 0;
        let opcode = (a >> 3) & 0x0F;
        let response = (a & (1 << 7)) > 0;
        let rescode = ResponseCode::from_num(b & 0x0F);
        let checking_disabled = (b & (1 << 4)) > 0;
        let authed_data = (b & (1 << 5)) > 0;
        let z = (b & (1 << 6)) > 0;
        let recursion_available = (b & (1 << 7)) > 0;

        let (rest, questions) = be_u16(rest)?;
        let (rest, answers) = be_u16(rest)?;
        let (rest, authoritative_entries) = be_u16(rest)?;
        let (rest, resource_entries) = be_u16(rest)?;

        let dns_header = DnsHeader {
            id,

            response,
            opcode,
            authoritative_answer,
            truncated_message,
            recursion_desired,

            recursion_available,
            z,
            authed_data,
            checking_disabled,
            rescode,

            questions,
            answers,
            authoritative_entries,
            resource_entries,
        };

        Ok((rest, dns_header))
    }
}

// A single length-prefixed label. Lengths above 63 (compression pointers included) are not
// labels and fail the parser.
fn label<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], &'a [u8], E>
where
    E: ParseError<&'a [u8]>,
{
    |input| {
        let (rest, size) = be_u8(input)?;
        if size > MAX_LABEL_LEN {
            return Err(nom::Err::Error(E::from_error_kind(input, ErrorKind::Verify)));
        }

        take_bytes(size as usize)(rest)
    }
}

// Walks the labels of the first question. Never fails: a label that cannot be read ends the walk
// and the labels gathered so far are returned with `complete` unset.
fn question_name<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], QuestionName, E>
where
    E: ParseError<&'a [u8]>,
{
    |input| {
        let mut dotted: Vec<u8> = Vec::new();
        let mut rest = input;

        let complete = loop {
            match be_u8::<_, E>(rest) {
                Ok((after, NULL_BYTE)) => {
                    rest = after;
                    break true;
                }
                Ok(_) => {}
                Err(_) => break false,
            }

            match label::<E>()(rest) {
                Ok((after, bytes)) => {
                    if !dotted.is_empty() {
                        dotted.push(b'.');
                    }
                    dotted.extend_from_slice(bytes);
                    rest = after;
                }
                Err(_) => {
                    debug!("malformed DNS request, label at {:x?}", &rest[..rest.len().min(2)]);
                    break false;
                }
            }
        };

        let mut name = String::from_utf8_lossy(&dotted).into_owned();
        truncate_name(&mut name);
        trace!("question name: {:?} (complete: {})", name, complete);

        Ok((rest, QuestionName { name, complete }))
    }
}

// Cuts the decoded name to at most MAX_NAME_LEN bytes without splitting a character.
fn truncate_name(name: &mut String) {
    if name.len() <= MAX_NAME_LEN {
        return;
    }

    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.truncate(end);
}

// Consumes an encoded name without decoding it. A compression pointer ends the name.
fn skip_name<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], (), E>
where
    E: ParseError<&'a [u8]>,
{
    |mut input: &'a [u8]| loop {
        let (rest, size) = be_u8(input)?;

        if size == NULL_BYTE {
            return Ok((rest, ()));
        }

        if size & POINTER_FLAG == POINTER_FLAG {
            let (rest, _jump_location) = be_u8(rest)?;
            return Ok((rest, ()));
        }

        let (rest, _) = label()(input)?;
        input = rest;
    }
}

// QTYPE and QCLASS
fn question_fields<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], (QueryType, u16), E>
where
    E: ParseError<&'a [u8]>,
{
    |input| {
        let (rest, qtype) = be_u16(input)?;
        let (rest, qclass) = be_u16(rest)?;

        Ok((rest, (QueryType::from_num(qtype), qclass)))
    }
}

fn record<'a, E>() -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], RecordSummary, E>
where
    E: ParseError<&'a [u8]>,
{
    |input| {
        let (rest, _) = skip_name()(input)?;
        let (rest, rtype) = be_u16(rest)?;
        let (rest, class) = be_u16(rest)?;
        let (rest, _ttl) = be_u32(rest)?;
        let (rest, rdata_len) = be_u16(rest)?;
        let (rest, _rdata) = take_bytes(rdata_len as usize)(rest)?;

        let summary = RecordSummary {
            rtype: QueryType::from_num(rtype),
            class,
            rdata_len,
        };

        Ok((rest, summary))
    }
}

// Everything after the first question's name: its fixed fields, the remaining questions and
// then the trailing records. Returns what is left after the last question, the first
// question's type and the records that could be read.
fn sections<'a>(
    input: &'a [u8],
    header: &DnsHeader,
) -> Option<(&'a [u8], QueryType, Vec<RecordSummary>)> {
    let (mut rest, (qtype, _qclass)) = question_fields::<Error>()(input).ok()?;

    for _ in 1..header.questions {
        let (after, _) = skip_name::<Error>()(rest).ok()?;
        let (after, _) = question_fields::<Error>()(after).ok()?;
        rest = after;
    }

    Some((rest, qtype, trailing_records(rest, header)))
}

// Resource records after the question section. Parsing stops at the first record that cannot be
// read.
fn trailing_records(input: &[u8], header: &DnsHeader) -> Vec<RecordSummary> {
    let mut records = Vec::new();
    let mut trailing = input;
    for _ in 0..header.trailing_records() {
        match record::<Error>()(trailing) {
            Ok((after, summary)) => {
                records.push(summary);
                trailing = after;
            }
            Err(e) => {
                debug!("Unable to parse trailing record: {:?}", e);
                break;
            }
        }
    }

    if !trailing.is_empty() {
        trace!("{} unaccounted bytes after the last record", trailing.len());
    }

    records
}

/// Decodes an inbound query.
///
/// Only a datagram too short to hold a header is an error. A question that cannot be parsed
/// degrades the query instead: the partial first-question name is kept for matching and every
/// byte past the header is echoed.
pub fn query(datagram: &[u8]) -> Result<DnsQuery<'_>, DecodeError> {
    if datagram.len() < HEADER_LEN {
        return Err(DecodeError::Truncated(datagram.len()));
    }

    let (body, header) = header::<Error>()(datagram)
        .map_err(|e| DecodeError::Header(format!("{:?}", e)))?;
    trace!("header: {:?}", header);

    // Without a question there is nothing to echo or to answer.
    if header.questions == 0 {
        let dropped = trailing_records(body, &header);

        return Ok(DnsQuery {
            header,
            question: QuestionName {
                name: String::new(),
                complete: true,
            },
            qtype: None,
            question_section: &body[..0],
            dropped,
            degraded: false,
        });
    }

    let (rest, question) = question_name::<Error>()(body)
        .map_err(|e| DecodeError::Header(format!("{:?}", e)))?;

    let parsed = if question.complete {
        sections(rest, &header)
    } else {
        None
    };

    let query = match parsed {
        Some((after_questions, qtype, dropped)) => {
            let section_len = body.len() - after_questions.len();

            DnsQuery {
                header,
                question,
                qtype: Some(qtype),
                question_section: &body[..section_len],
                dropped,
                degraded: false,
            }
        }
        None => DnsQuery {
            header,
            question,
            qtype: None,
            question_section: body,
            dropped: vec![],
            degraded: true,
        },
    };

    Ok(query)
}

/// Removes an option-less OPT record from the end of an unparsed section, recognised only by
/// its root name and type sitting exactly 11 bytes from the end. Any other shape, or a section
/// that would be left empty, is returned untouched.
pub fn strip_legacy_opt(section: &[u8]) -> &[u8] {
    if section.len() <= EMPTY_OPT_LEN {
        return section;
    }

    let start = section.len() - EMPTY_OPT_LEN;
    if section[start..start + EMPTY_OPT_SIGNATURE.len()] == EMPTY_OPT_SIGNATURE {
        trace!("stripping trailing OPT record");
        &section[..start]
    } else {
        section
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header(input: &[u8]) -> IResult<&[u8], DnsHeader> {
        super::header()(input)
    }

    fn name(input: &[u8]) -> IResult<&[u8], QuestionName> {
        super::question_name()(input)
    }

    fn record(input: &[u8]) -> IResult<&[u8], RecordSummary> {
        super::record()(input)
    }

    #[rustfmt::skip]
    fn portal_query() -> [u8; 30] {
        [
            0x12, 0x34, // identifier
            0x01, 0x00, // flags
            0x00, 0x01, // question count
            0x00, 0x00, // answer count
            0x00, 0x00, // authority count
            0x00, 0x00, // additional count
            0x06, 0x70, 0x6f, 0x72, 0x74, 0x61, 0x6c, 0x05, 0x6c, 0x6f, 0x63, 0x61, 0x6c, 0x00, // portal.local
            0x00, 0x01, // query type
            0x00, 0x01, // query class
        ]
    }

    #[rustfmt::skip]
    fn portal_query_with_cookie() -> [u8; 53] {
        [
            0x12, 0x34, // identifier
            0x01, 0x20, // flags
            0x00, 0x01, // question count
            0x00, 0x00, // answer count
            0x00, 0x00, // authority count
            0x00, 0x01, // additional count
            0x06, 0x70, 0x6f, 0x72, 0x74, 0x61, 0x6c, 0x05, 0x6c, 0x6f, 0x63, 0x61, 0x6c, 0x00, // portal.local
            0x00, 0x01, // query type
            0x00, 0x01, // query class
            0x00, // root
            0x00, 0x29, // OPT
            0x04, 0xd0, // udp payload size
            0x00, 0x00, 0x00, 0x00, // extended rcode and flags
            0x00, 0x0c, // len
            0x00, 0x0a, 0x00, 0x08, 0x8c, 0x1e, 0x4a, 0x02, 0x77, 0x10, 0x3b, 0x5f, // cookie
        ]
    }

    fn portal_header() -> DnsHeader {
        DnsHeader::builder()
            .id(0x1234)
            .recursion_desired(true)
            .questions(1)
            .build()
    }

    #[test]
    fn dns_header_parsing_works() {
        let (_, result) = header(&portal_query()[..12]).unwrap();

        assert_eq!(result, portal_header());
    }

    #[test]
    fn question_name_parsing_works() {
        let datagram = portal_query();
        let (rest, result) = name(&datagram[12..]).unwrap();

        assert_eq!(
            result,
            QuestionName {
                name: "portal.local".to_string(),
                complete: true,
            }
        );
        assert_eq!(rest, &[0x00u8, 0x01, 0x00, 0x01][..]);
    }

    #[test]
    fn question_name_is_capped() {
        let mut encoded = Vec::new();
        for _ in 0..3 {
            encoded.push(30);
            encoded.extend_from_slice(&[b'x'; 30]);
        }
        encoded.push(0);

        let (rest, result) = name(&encoded).unwrap();

        assert_eq!(result.name.len(), MAX_NAME_LEN);
        assert!(result.name.starts_with(&"x".repeat(30)));
        assert!(result.complete);
        assert!(rest.is_empty());
    }

    #[test]
    fn question_name_cap_keeps_characters_whole() {
        // 61 ASCII bytes followed by a two byte 'é' straddling the cap
        let mut encoded = vec![63];
        encoded.extend_from_slice(&[b'a'; 61]);
        encoded.extend_from_slice(&[0xc3, 0xa9]);
        encoded.push(0);

        let (_, result) = name(&encoded).unwrap();

        assert_eq!(result.name, "a".repeat(61));
        assert!(result.complete);
    }

    #[test]
    fn question_name_cap_counts_replacement_characters() {
        // invalid UTF-8 widens to U+FFFD when decoded
        let mut encoded = vec![40];
        encoded.extend_from_slice(&[0xff; 40]);
        encoded.push(0);

        let (_, result) = name(&encoded).unwrap();

        assert!(result.name.len() <= MAX_NAME_LEN);
        assert_eq!(result.name, "\u{fffd}".repeat(20));
    }

    #[test]
    fn question_name_stops_at_overlong_label() {
        // "portal" followed by a label claiming 63 bytes when only 2 remain
        let encoded = [0x06, 0x70, 0x6f, 0x72, 0x74, 0x61, 0x6c, 0x3f, 0x6c, 0x6f];

        let (_, result) = name(&encoded).unwrap();

        assert_eq!(result.name, "portal");
        assert!(!result.complete);
    }

    #[test]
    fn question_name_stops_at_pointer() {
        let encoded = [0x03, 0x77, 0x77, 0x77, 0xc0, 0x0c];

        let (_, result) = name(&encoded).unwrap();

        assert_eq!(result.name, "www");
        assert!(!result.complete);
    }

    #[test]
    fn question_name_stops_at_end_of_input() {
        let (_, result) = name(&[0x06, 0x70, 0x6f]).unwrap();

        assert_eq!(result.name, "");
        assert!(!result.complete);
    }

    #[test]
    fn opt_record_parsing_works() {
        let datagram = portal_query_with_cookie();
        let (rest, result) = record(&datagram[30..]).unwrap();

        assert_eq!(
            result,
            RecordSummary {
                rtype: QueryType::OPT,
                class: 1232,
                rdata_len: 12,
            }
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn record_name_may_be_a_pointer() {
        #[rustfmt::skip]
        let encoded = [
            0xc0, 0x0c, // name (Jump point)
            0x00, 0x01, 0x00, 0x01, // type and class
            0x00, 0x00, 0x00, 0x3c, // ttl
            0x00, 0x04, // len
            0x0a, 0x00, 0x00, 0x01, // ip
        ];

        let (rest, result) = record(&encoded).unwrap();

        assert_eq!(result.rtype, QueryType::A);
        assert!(rest.is_empty());
    }

    #[test]
    fn query_parsing_works() {
        let datagram = portal_query();

        let result = query(&datagram).unwrap();

        assert_eq!(result.header, portal_header());
        assert_eq!(result.name(), "portal.local");
        assert_eq!(result.qtype, Some(QueryType::A));
        assert_eq!(result.question_section, &datagram[12..]);
        assert!(result.dropped.is_empty());
        assert!(!result.degraded);
        assert!(result.is_standard_query());
    }

    #[test]
    fn query_parsing_separates_opt_record() {
        let datagram = portal_query_with_cookie();

        let result = query(&datagram).unwrap();

        assert_eq!(result.question_section, &datagram[12..30]);
        assert_eq!(result.dropped.len(), 1);
        assert!(result.dropped[0].is_opt());
        assert!(!result.degraded);
    }

    #[test]
    fn query_parsing_skips_extra_questions() {
        #[rustfmt::skip]
        let datagram = [
            0x00, 0x07, 0x01, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // header
            0x01, 0x61, 0x00, 0x00, 0x01, 0x00, 0x01, // a A IN
            0x01, 0x62, 0xc0, 0x0c, 0x00, 0x1c, 0x00, 0x01, // b.a AAAA IN
        ];

        let result = query(&datagram).unwrap();

        assert_eq!(result.name(), "a");
        assert_eq!(result.question_section, &datagram[12..]);
        assert!(!result.degraded);
    }

    #[test]
    fn malformed_query_degrades() {
        #[rustfmt::skip]
        let datagram = [
            0x00, 0x07, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // header
            0x06, 0x70, 0x6f, 0x72, 0x74, 0x61, 0x6c, 0x3f, 0x6c, 0x6f, // portal + broken label
        ];

        let result = query(&datagram).unwrap();

        assert_eq!(result.name(), "portal");
        assert_eq!(result.qtype, None);
        assert_eq!(result.question_section, &datagram[12..]);
        assert!(result.degraded);
    }

    #[test]
    fn missing_question_fields_degrade() {
        let datagram = portal_query();

        let result = query(&datagram[..27]).unwrap();

        assert_eq!(result.name(), "portal.local");
        assert!(result.degraded);
        assert_eq!(result.question_section.len(), 15);
    }

    #[test]
    fn query_without_questions_echoes_nothing() {
        #[rustfmt::skip]
        let datagram = [
            0x12, 0x34, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // header, no questions
            0x01, 0x61, 0x00, 0x00, 0x01, 0x00, 0x01, // a A IN
        ];

        let result = query(&datagram).unwrap();

        assert_eq!(result.name(), "");
        assert_eq!(result.qtype, None);
        assert!(result.question_section.is_empty());
        assert!(!result.has_question());
        assert!(!result.degraded);
    }

    #[test]
    fn header_only_query_has_no_question() {
        let datagram = portal_query();

        let result = query(&datagram[..12]).unwrap();

        assert!(result.question_section.is_empty());
        assert!(!result.has_question());
        assert!(result.degraded);
    }

    #[test]
    fn short_datagram_is_rejected() {
        assert_eq!(query(&[0x12, 0x34, 0x01]), Err(DecodeError::Truncated(3)));
    }

    #[test]
    fn legacy_opt_is_stripped() {
        #[rustfmt::skip]
        let section = [
            0x01, 0x61, 0x00, 0x00, 0x01, 0x00, 0x01, // a A IN
            0x00, 0x00, 0x29, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // empty OPT
        ];

        assert_eq!(strip_legacy_opt(&section), &section[..7]);
        assert_eq!(strip_legacy_opt(&section[..7]), &section[..7]);
    }

    #[test]
    fn legacy_opt_strip_keeps_a_lone_record() {
        #[rustfmt::skip]
        let section = [
            0x00, 0x00, 0x29, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // empty OPT
        ];

        assert_eq!(strip_legacy_opt(&section), &section[..]);
    }

    #[test]
    fn legacy_opt_needs_exact_signature() {
        let section = portal_query_with_cookie();

        assert_eq!(strip_legacy_opt(&section[12..]), &section[12..]);
    }
}
