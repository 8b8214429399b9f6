//! GRBL 1.1 dialect: response classification, status reports, error and
//! alarm codes, command builders.

pub mod commands;
pub mod error_decoder;
pub mod response_parser;
pub mod status_parser;

pub use response_parser::{classify, InboundMessage};
pub use status_parser::parse_status_report;
