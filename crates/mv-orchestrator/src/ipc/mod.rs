//! Backend transport to the local tunnel daemon
//!
//! Uses newline-delimited JSON over TCP on localhost.

mod backend;

pub use backend::IpcBackend;
