//! Wire protocol: event types, Describe/Info metadata, and framing codec.

pub mod codec;
pub mod event;
pub mod info;

pub use codec::{Decoded, EventDecoder, decode, encode};
pub use event::{Event, ErrorData, TranscribeData, TranscriptData};
pub use info::{AsrModel, AsrProgram, Attribution, InfoData};
