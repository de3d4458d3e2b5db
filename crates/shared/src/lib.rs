//! Shared infrastructure for the Gazette backend
//!
//! Database pool construction and migration running, used by both the
//! API server and the worker.

pub mod db;

pub use db::{create_migration_pool, create_pool, run_migrations};
