//! Content-Length framed JSON over a byte stream.
//!
//! Each message is a block of CRLF-terminated `Name: value` header
//! lines, a blank CRLF, then exactly `Content-Length` bytes of UTF-8
//! JSON. Unknown header fields are tolerated and carried along.

use std::io::{BufRead, Write};

use serde::Serialize;

use crate::Error;

#[derive(Debug, Clone)]
/// A message header.
/// In the current version of the protocol a header can only contain one
/// field: `Content-Length`. The framing was designed so a future
/// version can add fields, so unknown fields are kept rather than
/// rejected.
pub struct Header {
    /// "The length of the content part in bytes"
    pub len: usize,
    /// The list of header fields, both known and unknown.
    pub fields: Vec<HeaderField>,
}

impl Header {
    /// Take a list of `HeaderField` and return a Header if the list
    /// carries a length.
    fn from_raw_fields(fields: Vec<HeaderField>) -> Option<Self> {
        // try finding the ContentLength field
        let len = fields.iter().find_map(|field| match field {
            HeaderField::Len(num) => Some(*num),
            _ => None,
        })?; // if unable to find the content field, return none

        Some(Self { len, fields })
    }

    /// Read a header block from the stream. `Ok(None)` means the stream
    /// ended cleanly before a new message began.
    pub fn read_from<R: BufRead>(input: &mut R) -> Result<Option<Header>, Error> {
        let mut fields = Vec::new();

        loop {
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                if fields.is_empty() {
                    // end of stream between messages
                    return Ok(None);
                }
                // stream died inside a header block
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }

            match HeaderField::parse(line.as_str())? {
                Some(field) => fields.push(field),
                // a empty line signify the end of the header
                None => break,
            }
        }

        Header::from_raw_fields(fields)
            .ok_or(Error::BadMessage)
            .map(Some)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A message header field.
pub enum HeaderField {
    /// "The length of the content part in bytes"
    Len(usize),
    /// a unknown field
    Other { name: String, value: String },
}

impl HeaderField {
    fn specialize(self) -> Result<Self, Error> {
        match self {
            HeaderField::Other { name, value } if name == "Content-Length" => {
                let length = value.as_str().parse().or(Err(Error::BadMessage))?;
                Ok(HeaderField::Len(length))
            }
            _ => Ok(self),
        }
    }

    /// Parse a single header line. `Ok(None)` marks the blank line that
    /// ends the header block.
    fn parse(line: &str) -> Result<Option<HeaderField>, Error> {
        // a header field is compose of a name and a value separated by ':'
        let mut parts = line
            .split(':')
            .map(str::trim)
            .filter(|part| !part.is_empty());

        let name = parts.next();
        let value = parts.next();

        match (name, value, parts.next()) {
            // since ':' act as the separator between the name and the value,
            // the value should not contain a ':'
            (_, _, Some(_)) => Err(Error::BadMessage),
            // if the line is empty: return None
            (None, None, None) => Ok(None),
            (Some(name), Some(value), None) => {
                let header = HeaderField::Other {
                    name: name.to_string(),
                    value: value.to_string(),
                }
                .specialize()?;
                Ok(Some(header))
            }
            _ => Err(Error::BadMessage),
        }
    }
}

/// Read one framed JSON message. `Ok(None)` means the peer closed the
/// stream between messages; an EOF inside a message is an I/O error.
pub fn read_message<R: BufRead>(input: &mut R) -> Result<Option<serde_json::Value>, Error> {
    let header = match Header::read_from(input)? {
        Some(header) => header,
        None => return Ok(None),
    };

    let mut buffer = vec![0; header.len];
    input.read_exact(buffer.as_mut_slice())?;

    Ok(Some(serde_json::from_slice(buffer.as_slice())?))
}

/// Frame and send one message as a single write.
pub fn write_message<W: Write, M: Serialize>(output: &mut W, message: &M) -> Result<(), Error> {
    let body = serde_json::to_string(message)?;

    let mut framed = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    framed.extend_from_slice(body.as_bytes());

    output.write_all(framed.as_slice())?;
    output.flush()?;
    Ok(())
}
