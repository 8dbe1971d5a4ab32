//! # Game Client Library
//!
//! Client-side plumbing for the multiplayer falling-block game: the
//! front-desk HTTP calls, the realtime WebSocket connection with its
//! reader/writer pumps, and a renderer-agnostic session driver that runs
//! the deterministic engine from `shared` and reports its progress to the
//! room. Rendering and input mapping live with whatever frontend embeds
//! this crate.

pub mod network;
pub mod session;
