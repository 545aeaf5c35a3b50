//! Adapter implementations of the port traits.
//!
//! `live` talks to the real world, `recording` wraps live adapters and
//! captures every interaction in a cassette, and `replaying` serves a
//! cassette back.

pub mod live;
pub mod recording;
pub mod replaying;
