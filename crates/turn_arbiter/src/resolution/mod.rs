//! Interactive move resolution.
//!
//! Turns a sequence of board selections into one legal move by walking a
//! compressed prefix tree of the legal action-lists.

mod arena;
mod tree;

pub use tree::ResolutionTree;
