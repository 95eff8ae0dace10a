//! # Face Swap Telegram Bot
//!
//! A Telegram bot that swaps a user's face into GIFs, videos and photos.
//! Targets come from GIF search, replies, or GIFs noticed in chat; faces
//! come from a small saved set or a one-off upload. Swaps run as remote
//! jobs that are submitted, polled and delivered back into the chat.

pub mod bot;
pub mod callback;
pub mod circuit_breaker;
pub mod clock;
pub mod collector;
pub mod config;
pub mod db;
pub mod dedup;
pub mod errors;
pub mod gif_detection;
pub mod localization;
pub mod media;
pub mod model;
pub mod orchestrator;
pub mod persistence;
pub mod presentation;
pub mod providers;
pub mod rate_limiter;
pub mod session;
pub mod transport;

pub use errors::{BotError, BotResult};
pub use orchestrator::Orchestrator;
