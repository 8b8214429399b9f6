//! G-code tokenizing and interpretation

pub mod command;
pub mod interpreter;
pub mod tokenizer;

pub use command::{
    ArcParams, Command, DistanceMode, MotionCommand, MotionMode, OffsetTarget, ProbeMode,
    SpindleState,
};
pub use interpreter::{parse_line, GCodeInterpreter, ModalState};
pub use tokenizer::{strip_comments, tokenize, Token};
