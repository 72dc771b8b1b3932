#![allow(clippy::len_zero)]
// src/lib.rs

pub mod blockchain;
pub mod cli;
pub mod core;

// Hardware wallet support modules
pub mod hardware;
