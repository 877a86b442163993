//! Minimal DNS wire format handling
//!
//! Only what the gateway needs: reading the question out of a query and
//! synthesizing negative or failure responses. Question names in queries are
//! never compressed, so no pointer chasing is required.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// Fixed DNS header length in bytes
pub const HEADER_LEN: usize = 12;

/// RCODE for "no such domain"
pub const RCODE_NXDOMAIN: u8 = 3;
/// RCODE for "server failure"
pub const RCODE_SERVFAIL: u8 = 2;

const FLAG_QR: u16 = 0x8000;
const FLAG_RA: u16 = 0x0080;
const FLAG_RD: u16 = 0x0100;
const MASK_OPCODE: u16 = 0x7800;

/// Identity and question of a DNS query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Transaction id
    pub id: u16,
    /// Query name, lowercased, no trailing dot
    pub name: String,
    /// Query type (A, AAAA, ...)
    pub qtype: u16,
    /// Query class (usually IN)
    pub qclass: u16,
}

/// Transaction id of a message, if it is long enough to have one
pub fn transaction_id(msg: &[u8]) -> Option<u16> {
    msg.get(0..2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

/// Overwrite the transaction id in place
pub fn set_transaction_id(msg: &mut [u8], id: u16) {
    if msg.len() >= 2 {
        msg[0..2].copy_from_slice(&id.to_be_bytes());
    }
}

/// Parse the first question of a DNS query
///
/// Rejects responses, empty question sections, compressed names and
/// truncated messages.
pub fn parse_question(msg: &[u8]) -> Result<Question> {
    if msg.len() < HEADER_LEN {
        return Err(Error::dns_parse("message shorter than header"));
    }

    let id = u16::from_be_bytes([msg[0], msg[1]]);
    let flags = u16::from_be_bytes([msg[2], msg[3]]);
    if flags & FLAG_QR != 0 {
        return Err(Error::dns_parse("message is a response, not a query"));
    }
    let qdcount = u16::from_be_bytes([msg[4], msg[5]]);
    if qdcount == 0 {
        return Err(Error::dns_parse("query carries no question"));
    }

    let (name, pos) = read_name(msg, HEADER_LEN)?;
    let fixed = msg
        .get(pos..pos + 4)
        .ok_or_else(|| Error::dns_parse("truncated question"))?;

    Ok(Question {
        id,
        name,
        qtype: u16::from_be_bytes([fixed[0], fixed[1]]),
        qclass: u16::from_be_bytes([fixed[2], fixed[3]]),
    })
}

/// Synthetic NXDOMAIN answer for a blocked query
pub fn nxdomain_response(query: &[u8]) -> Result<Vec<u8>> {
    negative_response(query, RCODE_NXDOMAIN)
}

/// SERVFAIL answer for an upstream that did not respond
pub fn servfail_response(query: &[u8]) -> Result<Vec<u8>> {
    negative_response(query, RCODE_SERVFAIL)
}

fn negative_response(query: &[u8], rcode: u8) -> Result<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return Err(Error::dns_parse("message shorter than header"));
    }
    let (_, name_end) = read_name(query, HEADER_LEN)?;
    let question_end = name_end + 4;
    if query.len() < question_end {
        return Err(Error::dns_parse("truncated question"));
    }

    let flags = u16::from_be_bytes([query[2], query[3]]);
    let response_flags = FLAG_QR | FLAG_RA | (flags & (MASK_OPCODE | FLAG_RD)) | u16::from(rcode);

    let mut buf = BytesMut::with_capacity(question_end);
    buf.put_slice(&query[0..2]); // transaction id
    buf.put_u16(response_flags);
    buf.put_u16(1); // QDCOUNT: echo the question
    buf.put_u16(0); // ANCOUNT
    buf.put_u16(0); // NSCOUNT
    buf.put_u16(0); // ARCOUNT
    buf.put_slice(&query[HEADER_LEN..question_end]);

    Ok(buf.to_vec())
}

/// Read an uncompressed name starting at `pos`; returns the name and the
/// offset just past its terminating zero label
fn read_name(msg: &[u8], mut pos: usize) -> Result<(String, usize)> {
    let mut name = String::new();

    loop {
        let len = *msg
            .get(pos)
            .ok_or_else(|| Error::dns_parse("truncated name"))? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        if len & 0xC0 != 0 {
            return Err(Error::dns_parse("compressed name in question"));
        }

        let label = msg
            .get(pos + 1..pos + 1 + len)
            .ok_or_else(|| Error::dns_parse("truncated label"))?;
        if !name.is_empty() {
            name.push('.');
        }
        for &b in label {
            name.push(char::from(b.to_ascii_lowercase()));
        }
        if name.len() > 255 {
            return Err(Error::dns_parse("name too long"));
        }

        pos += 1 + len;
    }

    Ok((name, pos))
}

/// Build a standard query for `name` with recursion desired
///
/// Used by tests and diagnostic probes; the gateway itself only relays
/// client-built queries.
pub fn encode_query(id: u16, name: &str, qtype: u16) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u16(id);
    buf.put_u16(FLAG_RD); // standard query, recursion desired
    buf.put_u16(1); // QDCOUNT
    buf.put_u16(0);
    buf.put_u16(0);
    buf.put_u16(0);
    for label in name.split('.') {
        buf.put_u8(label.len() as u8);
        buf.put_slice(label.as_bytes());
    }
    buf.put_u8(0);
    buf.put_u16(qtype);
    buf.put_u16(1); // IN
    buf.to_vec()
}
