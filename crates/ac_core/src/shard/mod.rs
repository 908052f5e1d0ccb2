//! Shard echoes: recurring world encounters and their instanced sessions.

pub mod instance;
pub mod schedule;
pub mod template;
