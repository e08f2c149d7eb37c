//! Session layer: one client connection's transcription lifecycle.

pub mod cursor;
pub mod session;

pub use cursor::TranscriptCursor;
pub use session::{Session, SessionConfig, SessionState};
