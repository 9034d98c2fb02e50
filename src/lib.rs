//! `exo-classify` library crate.
//!
//! The binary (`exo`) is a thin wrapper around this library so that:
//!
//! - the service operations are testable without spawning processes
//! - a different front-end (e.g. an HTTP layer) can reuse `app::Service`

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod io;
pub mod logging;
pub mod models;
pub mod store;
pub mod train;
