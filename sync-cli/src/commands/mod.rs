//! CLI command implementations.

pub mod listen;
pub mod login;
pub mod send;
