//! Controller dialects

pub mod grbl;
