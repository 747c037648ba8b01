//! PostgreSQL backend for the db-loadtest workload driver.
//!
//! The workload runs against a single table in a dedicated database:
//!
//! ```sql
//! CREATE TABLE test_records (
//!     id UUID PRIMARY KEY,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     payload VARCHAR(200) NOT NULL
//! );
//! ```
//!
//! with ascending and descending indexes on `created_at`.

pub mod args;
pub mod backend;
pub mod error;
pub mod statements;

pub use args::PostgreSQLBackendArgs;
pub use backend::{PostgreSQLBackend, PostgreSQLConnection, PostgreSQLTransaction};
pub use error::PostgreSQLWorkloadError;
