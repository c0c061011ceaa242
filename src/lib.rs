// Core infrastructure modules
pub mod core;

// Ambient modules
pub mod cli;
pub mod config;
pub mod logging;

pub use crate::core::db::{
    connect, execute, query, try_connect, ColumnSpec, ConnectFailure, ConnectFailureKind, Credentials,
    MutationOutcome, QueryOutcome, QueryResult, Session, Value,
};
pub use crate::core::{HospdbError, Result};
