//! Public library modules for the CLI crate
pub mod prompt;
pub mod render;
