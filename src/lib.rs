//! Parley — a client-side conversation engine for agent backends.
//!
//! This crate reconciles two delivery channels for the same logical work: a
//! request/response chat call and a long-lived push channel of incremental
//! agent events. Both feed a single ordered transcript with no duplicated or
//! lost assistant answers, a live reasoning trace, and an approval handshake
//! for privileged agent actions.
//!
//! # Quick start
//!
//! ```no_run
//! use parley::config::load_config;
//! use parley::engine::ChatEngine;
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let mut engine = ChatEngine::new(config);
//! engine.submit("Summarize the workspace").await;
//! for turn in engine.turns() {
//!     println!("[{:?}] {}", turn.role, turn.content);
//! }
//! # }
//! ```

pub mod api;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod push;
pub mod session;
#[cfg(test)]
pub mod testsupport;
pub mod textutil;
pub mod trace;
pub mod types;
