//! Host command bus side: header format and the command decoder

mod decoder;
mod header;

pub use decoder::{CommandDecoder, HostOutputs};
pub use header::{AccelId, CommandHeader, EncType, Operation};
