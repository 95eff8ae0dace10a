//! Session module
//!
//! Ephemeral, in-memory state for the two interactive flows:
//! - `types`: session records, ids and the state machine
//! - `store`: keyed store with verified updates and TTL sweeping

pub mod store;
pub mod types;

pub use store::{Guard, MemoryBackend, SessionBackend, SessionStore};
pub use types::{
    FaceSelection, GifResult, PageStep, PromptRef, SearchPatch, SearchSession, SessionId,
    SessionRecord, SessionState, SwapPatch, SwapSession,
};
