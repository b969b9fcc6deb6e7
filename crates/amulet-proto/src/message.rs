//! DNS message assembly and parsing.

use crate::error::{Error, Result};
use crate::header::{Header, HEADER_SIZE};
use crate::question::Question;
use crate::record::Answer;
use bytes::{Bytes, BytesMut};

/// Byte offset of the question section.
pub const QUESTION_OFFSET: usize = HEADER_SIZE;

/// A DNS message as Amulet speaks it: header, one question, and answers.
///
/// Authority and additional sections are never emitted; `nscount` and
/// `arcount` exist only as header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message header.
    pub header: Header,

    /// The single question.
    pub question: Question,

    /// Answer records (empty for queries).
    pub answers: Vec<Answer>,
}

impl Message {
    /// Parses a query: header plus the first question.
    ///
    /// Any further questions the wire might claim are ignored, as are
    /// answer/authority/additional sections of inbound packets.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = Header::parse(data)?;
        let question = Question::parse_at(data, QUESTION_OFFSET)?;

        Ok(Self {
            header,
            question,
            answers: Vec::new(),
        })
    }

    /// Builds a fresh outbound query with the given id and raw flags.
    pub fn query(id: u16, flags: u16, question: Question) -> Self {
        let mut header = Header::new(id);
        header.flags = flags;
        header.qdcount = 1;

        Self {
            header,
            question,
            answers: Vec::new(),
        }
    }

    /// Serializes the message: header ‖ question ‖ answers.
    pub fn to_wire(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(crate::MAX_UDP_MESSAGE_SIZE);

        self.header.write_to(&mut buf);
        self.question.encode(&mut buf)?;
        for answer in &self.answers {
            answer.encode(&mut buf);
        }

        Ok(buf.freeze())
    }

    /// Decodes the answer section of an upstream response.
    ///
    /// The question section is skipped, then `ancount` answers are read.
    /// Names are taken as raw bytes: a leading byte ≥ 0xC0 means a 2-byte
    /// compression pointer, copied verbatim; otherwise labels are walked
    /// until a zero length or an embedded pointer. An `ancount` of zero
    /// yields an empty list (a NODATA answer, not an error).
    pub fn decode_answers(data: &[u8]) -> Result<Vec<Answer>> {
        if data.len() < HEADER_SIZE {
            return Err(Error::malformed_header(data.len()));
        }

        let ancount = u16::from_be_bytes([data[6], data[7]]) as usize;
        let mut offset = HEADER_SIZE;

        // Skip the question section
        while offset < data.len() {
            let length = data[offset] as usize;
            if length == 0 {
                offset += 1;
                break;
            }
            if length >= 0xC0 {
                offset += 2;
                break;
            }
            offset += 1 + length;
        }
        offset += 4; // qtype + qclass

        let mut answers = Vec::with_capacity(ancount);

        for _ in 0..ancount {
            if offset >= data.len() {
                return Err(Error::truncated_answer(offset));
            }

            let name = if data[offset] >= 0xC0 {
                if offset + 2 > data.len() {
                    return Err(Error::truncated_answer(offset));
                }
                let name = Bytes::copy_from_slice(&data[offset..offset + 2]);
                offset += 2;
                name
            } else {
                let mut end = offset;
                while end < data.len() {
                    let length = data[end] as usize;
                    if length == 0 {
                        end += 1;
                        break;
                    }
                    if length >= 0xC0 {
                        end += 2;
                        break;
                    }
                    end += 1 + length;
                }
                let name = Bytes::copy_from_slice(&data[offset..end.min(data.len())]);
                offset = end;
                name
            };

            if offset + 10 > data.len() {
                return Err(Error::truncated_answer(offset));
            }

            let rtype = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let rclass = u16::from_be_bytes([data[offset + 2], data[offset + 3]]);
            let ttl = u32::from_be_bytes([
                data[offset + 4],
                data[offset + 5],
                data[offset + 6],
                data[offset + 7],
            ]);
            let rdlength = u16::from_be_bytes([data[offset + 8], data[offset + 9]]) as usize;
            offset += 10;

            if offset + rdlength > data.len() {
                return Err(Error::IncompleteAnswerData {
                    needed: rdlength,
                    available: data.len() - offset,
                });
            }

            let rdata = Bytes::copy_from_slice(&data[offset..offset + rdlength]);
            offset += rdlength;

            answers.push(Answer {
                name,
                rtype,
                rclass,
                ttl,
                rdlength: rdlength as u16,
                rdata,
            });
        }

        Ok(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Flags;
    use bytes::BufMut;

    fn sample_query() -> Message {
        Message::query(0x1234, Flags::RD.bits(), Question::new("example.com", 1, 1))
    }

    /// Builds a wire response: the query's header/question with QR set,
    /// followed by `answers` raw record bytes.
    fn wire_response(query: &Message, ancount: u16, answers: &[u8]) -> Vec<u8> {
        let mut response = query.clone();
        response.header.set_response();
        response.header.ancount = ancount;

        let mut buf = BytesMut::new();
        buf.put_slice(&response.to_wire().unwrap());
        buf.put_slice(answers);
        buf.to_vec()
    }

    #[test]
    fn test_parse_roundtrip() {
        let query = sample_query();
        let wire = query.to_wire().unwrap();

        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.header, query.header);
        assert_eq!(parsed.question, query.question);
        assert!(parsed.answers.is_empty());
    }

    #[test]
    fn test_parse_short_input() {
        assert!(matches!(
            Message::parse(&[0u8; 5]),
            Err(Error::MalformedHeader { actual: 5 })
        ));
    }

    #[test]
    fn test_decode_answers_pointer_name() {
        let query = sample_query();
        // One A record with a compression pointer name
        let rr = [
            0xC0, 0x0C, // pointer to offset 12
            0, 1, // type A
            0, 1, // class IN
            0, 0, 0, 60, // ttl
            0, 4, // rdlength
            93, 184, 216, 34, // rdata
        ];
        let wire = wire_response(&query, 1, &rr);

        let answers = Message::decode_answers(&wire).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(&answers[0].name[..], &[0xC0, 0x0C]);
        assert_eq!(answers[0].rtype, 1);
        assert_eq!(answers[0].ttl, 60);
        assert_eq!(&answers[0].rdata[..], &[93, 184, 216, 34]);
    }

    #[test]
    fn test_decode_answers_label_name() {
        let query = sample_query();
        let mut rr = Vec::new();
        rr.extend_from_slice(&[7]);
        rr.extend_from_slice(b"example");
        rr.extend_from_slice(&[3]);
        rr.extend_from_slice(b"com");
        rr.push(0);
        rr.extend_from_slice(&[0, 1, 0, 1, 0, 0, 1, 44, 0, 4, 1, 2, 3, 4]);
        let wire = wire_response(&query, 1, &rr);

        let answers = Message::decode_answers(&wire).unwrap();
        assert_eq!(answers.len(), 1);
        assert_eq!(answers[0].name.len(), 13);
        assert_eq!(answers[0].ttl, 300);
    }

    #[test]
    fn test_decode_answers_multiple() {
        let query = sample_query();
        let mut rrs = Vec::new();
        for ip in [[1, 1, 1, 1], [2, 2, 2, 2]] {
            rrs.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0, 30, 0, 4]);
            rrs.extend_from_slice(&ip);
        }
        let wire = wire_response(&query, 2, &rrs);

        let answers = Message::decode_answers(&wire).unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(&answers[1].rdata[..], &[2, 2, 2, 2]);
    }

    #[test]
    fn test_decode_answers_empty_is_ok() {
        let query = sample_query();
        let wire = wire_response(&query, 0, &[]);

        let answers = Message::decode_answers(&wire).unwrap();
        assert!(answers.is_empty());
    }

    #[test]
    fn test_decode_answers_truncated_fixed_fields() {
        let query = sample_query();
        // Pointer name then only 4 of the 10 fixed bytes
        let wire = wire_response(&query, 1, &[0xC0, 0x0C, 0, 1, 0, 1]);

        assert!(matches!(
            Message::decode_answers(&wire),
            Err(Error::TruncatedAnswer { .. })
        ));
    }

    #[test]
    fn test_decode_answers_incomplete_rdata() {
        let query = sample_query();
        // rdlength says 4 but only 2 bytes follow
        let wire = wire_response(
            &query,
            1,
            &[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4, 9, 9],
        );

        assert_eq!(
            Message::decode_answers(&wire),
            Err(Error::IncompleteAnswerData {
                needed: 4,
                available: 2
            })
        );
    }

    #[test]
    fn test_decode_answers_count_overruns_buffer() {
        let query = sample_query();
        // Claims two answers, carries one
        let wire = wire_response(
            &query,
            2,
            &[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 0, 60, 0, 4, 9, 9, 9, 9],
        );

        assert!(matches!(
            Message::decode_answers(&wire),
            Err(Error::TruncatedAnswer { .. })
        ));
    }

    #[test]
    fn test_to_wire_layout() {
        let mut message = sample_query();
        message.header.set_response();
        message.header.set_recursion_available();
        message.header.ancount = 1;
        message.answers.push(Answer::synthesize(
            crate::name::encode("example.com").unwrap(),
            1,
            1,
            600,
            Bytes::from_static(&[0, 0, 0, 0]),
        ));

        let wire = message.to_wire().unwrap();

        // Header
        assert_eq!(&wire[0..2], &[0x12, 0x34]);
        assert_eq!(&wire[2..4], &[0x81, 0x80]);
        assert_eq!(&wire[6..8], &[0x00, 0x01]);
        // Question name starts right after the header
        assert_eq!(wire[12], 7);
        // Answer section carries the 600s TTL
        let answer_ttl = &wire[wire.len() - 10..wire.len() - 6];
        assert_eq!(answer_ttl, &600u32.to_be_bytes());
    }
}
