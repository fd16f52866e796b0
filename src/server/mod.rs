// src/server/mod.rs
mod builder;
pub mod socket;

pub use builder::{Server, ServerBuilder};
