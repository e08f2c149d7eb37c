//! PCM audio handling: negotiated format validation and the per-session
//! frame buffer that turns a byte stream into decode windows.

pub mod buffer;
pub mod format;

pub use buffer::FrameBuffer;
pub use format::AudioFormat;
