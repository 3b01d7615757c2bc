//! Configuration loading, secret resolution, and wiring of the indexing and
//! query pipeline for Lumen.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod vault;
