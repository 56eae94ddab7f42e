//! Streaming Response Aggregation
//!
//! Turns the byte chunks of one response into a single growing string.
//!
//! ```text
//!   transport chunks ──► Utf8StreamDecoder ──► ResponseCycle.full ──► store
//!   [b"Hi ", b"\xC3"]     (carry: [0xC3])        "Hi "                update(handle, full)
//!   [b"\xA9"]             (carry: [])            "Hi é"               update(handle, full)
//! ```
//!
//! The decoder keeps undecoded trailing bytes between calls, so characters
//! split across chunk boundaries come out intact.

mod cycle;
mod decoder;

pub use cycle::{CycleStats, ResponseCycle};
pub use decoder::{DecodeError, DecodeMode, Utf8StreamDecoder};
