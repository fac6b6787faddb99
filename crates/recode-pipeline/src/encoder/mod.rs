//! Encoder subprocess management.
//!
//! `args` builds the command line for both invocation modes, `parser`
//! turns the diagnostic stream into completion fractions, and `process`
//! owns spawn, deadline, termination and the process registry.

pub mod args;
pub mod parser;
pub mod process;

pub use parser::{ParserState, ProgressUpdate};
pub use process::{EncoderProcess, ProcessRegistry};
