//! mixvpn CLI library
//!
//! Command implementations and terminal formatting for the `mixvpn` binary.

pub mod commands;
pub mod output;
