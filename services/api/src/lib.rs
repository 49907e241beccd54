//! Aima API Library Crate
//!
//! This library contains the HTTP surface of the Aima tutor: configuration,
//! shared state, API handlers, routing and the idle session sweeper. The
//! `api` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod sweeper;
