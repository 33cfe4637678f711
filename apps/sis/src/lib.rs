//! # sis
//!
//! The Student Information System portal: a server-rendered axum web
//! application and its command line tools, built on `sis-core`.

pub mod api;
pub mod cli;
pub mod config;
