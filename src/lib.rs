// ABOUTME: Library crate for pod-terminal exposing the terminal bridge for testing and embedding

pub mod config;
pub mod exec;
pub mod server;
pub mod terminal;
