//! Messaging backend implementations.

pub mod memory;
pub mod rest;
