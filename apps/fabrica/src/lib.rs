//! # fabrica
//!
//! Command line front end over `fabrica-core`. The binary in `main.rs` only
//! initializes logging and hands off to [`cli::execute`].

pub mod cli;
pub mod config;
