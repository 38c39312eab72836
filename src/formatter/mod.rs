//! # Message Formatter
//!
//! Turns one raw payload into the text block printed on stdout. The mode is
//! fixed at startup by the `-raw` flag:
//!
//! - [`OutputMode::Raw`]: the payload is checked to be JSON and re-indented
//!   with two spaces; every token is kept exactly as received.
//! - [`OutputMode::Decoded`]: the payload is read as an [`UplinkEnvelope`] and
//!   the decoded `bytes` field is written out unchanged.
//!
//! Both modes prefix the body with a `Message:` line. A payload that cannot be
//! parsed produces no output at all; the reason is logged to stderr.

pub mod indent;
pub mod uplink;

use std::io::{self, Write};

use thiserror::Error;
use tracing::warn;

pub use uplink::UplinkEnvelope;

pub const MESSAGE_HEADER: &str = "Message:";
const JSON_INDENT: &str = "  ";

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("failed to parse message: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to write message: {0}")]
    Write(#[from] io::Error),
}

impl FormatError {
    /// Parse failures only cost the one message; write failures are about the sink.
    pub fn is_parse(&self) -> bool {
        matches!(self, FormatError::Parse(_))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Decoded,
    Raw,
}

impl OutputMode {
    pub fn from_raw_flag(raw: bool) -> Self {
        if raw {
            OutputMode::Raw
        } else {
            OutputMode::Decoded
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFormatter {
    mode: OutputMode,
}

impl MessageFormatter {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Formats the body without the header line.
    pub fn format_body(&self, payload: &[u8]) -> Result<Vec<u8>, FormatError> {
        match self.mode {
            OutputMode::Raw => Ok(indent::indent_json(payload, JSON_INDENT)?),
            OutputMode::Decoded => Ok(UplinkEnvelope::from_slice(payload)?.into_bytes()),
        }
    }

    /// Writes `Message:\n<body>\n`. Nothing reaches `out` if the payload
    /// does not parse.
    pub fn render<W: Write>(&self, payload: &[u8], out: &mut W) -> Result<(), FormatError> {
        let body = match self.format_body(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!("{}", e);
                return Err(e);
            }
        };

        let mut block = Vec::with_capacity(MESSAGE_HEADER.len() + body.len() + 2);
        block.extend_from_slice(MESSAGE_HEADER.as_bytes());
        block.push(b'\n');
        block.extend_from_slice(&body);
        block.push(b'\n');

        out.write_all(&block)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(mode: OutputMode, payload: &[u8]) -> (Result<(), FormatError>, String) {
        let mut out = Vec::new();
        let result = MessageFormatter::new(mode).render(payload, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn decoded_mode_prints_payload_text() {
        let (result, out) = render(
            OutputMode::Decoded,
            br#"{"uplink_message":{"decoded_payload":{"bytes":"aGVsbG8="}}}"#,
        );
        assert!(result.is_ok());
        assert_eq!(out, "Message:\nhello\n");
    }

    #[test]
    fn decoded_mode_writes_bytes_verbatim() {
        let mut out = Vec::new();
        MessageFormatter::new(OutputMode::Decoded)
            .render(
                br#"{"uplink_message":{"decoded_payload":{"bytes":[255,0,10]}}}"#,
                &mut out,
            )
            .unwrap();
        assert_eq!(out, b"Message:\n\xff\x00\n\n");
    }

    #[test]
    fn raw_mode_indents_with_two_spaces_in_source_order() {
        let (result, out) = render(OutputMode::Raw, br#"{"z":1,"a":{"b":[true,null]}}"#);
        assert!(result.is_ok());
        assert_eq!(
            out,
            "Message:\n{\n  \"z\": 1,\n  \"a\": {\n    \"b\": [\n      true,\n      null\n    ]\n  }\n}\n"
        );
    }

    #[test]
    fn raw_mode_keeps_payload_tokens() {
        let (result, out) = render(
            OutputMode::Raw,
            br#"{"n":1e3,"big":123456789012345678901234567890,"f":1.50,"s":"\u00e9"}"#,
        );
        assert!(result.is_ok());
        assert_eq!(
            out,
            "Message:\n{\n  \"n\": 1e3,\n  \"big\": 123456789012345678901234567890,\n  \"f\": 1.50,\n  \"s\": \"\\u00e9\"\n}\n"
        );
    }

    #[test]
    fn raw_mode_accepts_any_json_shape() {
        let (_, out) = render(OutputMode::Raw, b"\"plain string\"");
        assert_eq!(out, "Message:\n\"plain string\"\n");

        let (_, out) = render(OutputMode::Raw, b"[]");
        assert_eq!(out, "Message:\n[]\n");
    }

    #[test]
    fn malformed_payload_prints_nothing_in_either_mode() {
        for mode in [OutputMode::Raw, OutputMode::Decoded] {
            let (result, out) = render(mode, b"{not json");
            assert!(result.unwrap_err().is_parse());
            assert!(out.is_empty());
        }
    }

    #[test]
    fn decoded_mode_drops_other_shapes() {
        let (result, out) = render(OutputMode::Decoded, br#"{"hello":"world"}"#);
        assert!(result.is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn raw_flag_selects_mode() {
        assert_eq!(OutputMode::from_raw_flag(true), OutputMode::Raw);
        assert_eq!(OutputMode::from_raw_flag(false), OutputMode::Decoded);
        assert_eq!(MessageFormatter::default().mode(), OutputMode::Decoded);
    }
}
