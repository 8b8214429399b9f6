//! GRBL Response Parser
//!
//! Classifies each inbound line as a status report, a terminal response
//! to the outstanding command (`ok`, `error:n`, `ALARM:n`), the startup
//! banner, or free text.

use super::error_decoder::{decode_alarm, decode_error};
use super::status_parser::parse_status_report;
use gcodelink_core::{ProtocolError, StatusReport};
use std::fmt;

/// A classified inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// `<...>` status report
    Status(StatusReport),
    /// `ok`
    Ok,
    /// `error:n` (or legacy `error: text`)
    Error { code: Option<u32>, text: String },
    /// `ALARM:n`
    Alarm { code: u32, text: String },
    /// `Grbl 1.1h ['$' for help]`, sent at power-up and after a soft reset
    Banner(String),
    /// Anything else: `[MSG:...]`, `[GC:...]`, setting dumps
    Text(String),
}

impl InboundMessage {
    /// Whether this line ends the outstanding command
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InboundMessage::Ok | InboundMessage::Error { .. } | InboundMessage::Alarm { .. }
        )
    }

    /// Human-readable description of an error or alarm
    pub fn describe(&self) -> Option<String> {
        match self {
            InboundMessage::Error {
                code: Some(code), ..
            } => Some(decode_error(*code)),
            InboundMessage::Error { code: None, text } => Some(text.clone()),
            InboundMessage::Alarm { code, .. } => Some(decode_alarm(*code)),
            _ => None,
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(report) => write!(f, "<{}>", report.state),
            Self::Ok => write!(f, "ok"),
            Self::Error { text, .. } | Self::Alarm { text, .. } => write!(f, "{}", text),
            Self::Banner(text) | Self::Text(text) => write!(f, "{}", text),
        }
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Classify one inbound line (terminator already removed)
pub fn classify(line: &str) -> Result<InboundMessage, ProtocolError> {
    let line = line.trim();

    if line.starts_with('<') {
        return parse_status_report(line).map(InboundMessage::Status);
    }

    if line.eq_ignore_ascii_case("ok") {
        return Ok(InboundMessage::Ok);
    }

    if let Some(rest) = strip_prefix_ignore_case(line, "error:") {
        return Ok(InboundMessage::Error {
            code: rest.trim().parse::<u32>().ok(),
            text: line.to_string(),
        });
    }

    if let Some(rest) = strip_prefix_ignore_case(line, "ALARM:") {
        let code = rest.trim().parse::<u32>().unwrap_or(0);
        return Ok(InboundMessage::Alarm {
            code,
            text: line.to_string(),
        });
    }

    if line.starts_with("Grbl ") {
        return Ok(InboundMessage::Banner(line.to_string()));
    }

    Ok(InboundMessage::Text(line.to_string()))
}
