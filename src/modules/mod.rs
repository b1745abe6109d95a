//! Builtin module types.

pub mod go_binary;

pub use go_binary::{GoBinary, GoBinaryProperties};
