//! Cassette format for recording and replaying provider interactions.
//!
//! A cassette is a YAML file holding every clock reading and metadata lookup
//! of one run, in order. Replaying it reproduces the run offline.

pub mod format;
pub mod recorder;
pub mod replayer;
