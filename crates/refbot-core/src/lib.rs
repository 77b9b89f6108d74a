//! Shared primitives for refbot's outbound HTTP clients.

pub mod retry;
