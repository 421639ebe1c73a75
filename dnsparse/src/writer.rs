use std::net::Ipv4Addr;

use crate::types::{DnsHeader, DnsResponse, QueryType};

// Answers are never cached by the client.
pub const ANSWER_TTL: u32 = 0;
// Pointer, TYPE, CLASS, TTL, RDLENGTH and an IPv4 address.
pub const ANSWER_LEN: usize = 16;

// Compression pointer to offset 12, where the echoed question name starts.
const QUESTION_NAME_POINTER: u16 = 0xc00c;
const CLASS_IN: u16 = 1;

struct BytePacketBuffer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> BytePacketBuffer<'a> {
    /// Wraps the caller's scratch buffer; nothing is ever written past its end.
    pub fn new(buffer: &'a mut [u8]) -> BytePacketBuffer<'a> {
        BytePacketBuffer {
            buf: buffer,
            pos: 0,
        }
    }

    fn write(&mut self, val: u8) -> anyhow::Result<()> {
        if self.pos >= self.buf.len() {
            anyhow::bail!("End of buffer")
        }
        self.buf[self.pos] = val;
        self.pos += 1;
        Ok(())
    }

    fn write_u8(&mut self, val: u8) -> anyhow::Result<()> {
        self.write(val)?;

        Ok(())
    }

    fn write_u16(&mut self, val: u16) -> anyhow::Result<()> {
        self.write((val >> 8) as u8)?;
        self.write((val & 0xFF) as u8)?;

        Ok(())
    }

    fn write_u32(&mut self, val: u32) -> anyhow::Result<()> {
        self.write(((val >> 24) & 0xFF) as u8)?;
        self.write(((val >> 16) & 0xFF) as u8)?;
        self.write(((val >> 8) & 0xFF) as u8)?;
        self.write((val & 0xFF) as u8)?;

        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            anyhow::bail!(
                "{} bytes do not fit, {} of {} already used",
                bytes.len(),
                self.pos,
                self.buf.len()
            )
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;

        Ok(())
    }
}

/// Writes `response` into `buf` and returns the number of bytes used.
pub fn write(buf: &mut [u8], response: &DnsResponse) -> anyhow::Result<usize> {
    let mut buffer = BytePacketBuffer::new(buf);

    write_header(&response.header, &mut buffer)?;
    buffer.write_bytes(response.question_section)?;

    if let Some(addr) = response.answer {
        write_answer(&addr, &mut buffer)?;
    }

    Ok(buffer.pos)
}

fn write_header(header: &DnsHeader, buffer: &mut BytePacketBuffer) -> anyhow::Result<()> {
    buffer.write_u16(header.id)?;
    buffer.write_u16(header.flags())?;
    buffer.write_u16(header.questions)?;
    buffer.write_u16(header.answers)?;
    buffer.write_u16(header.authoritative_entries)?;
    buffer.write_u16(header.resource_entries)?;

    Ok(())
}

fn write_answer(addr: &Ipv4Addr, buffer: &mut BytePacketBuffer) -> anyhow::Result<()> {
    buffer.write_u16(QUESTION_NAME_POINTER)?;
    buffer.write_u16(QueryType::A.to_num())?;
    buffer.write_u16(CLASS_IN)?;
    buffer.write_u32(ANSWER_TTL)?;
    buffer.write_u16(4)?;

    for octet in &addr.octets() {
        buffer.write_u8(*octet)?;
    }

    Ok(())
}
