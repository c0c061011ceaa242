/// Database Module
///
/// The database layer is split into four concerns:
/// - **Connection** (`connection.rs`): opens sessions from credentials and classifies failures
/// - **Query** (`query.rs`): runs a statement and materializes rows and column names
/// - **Mutation** (`mutation.rs`): runs a statement in a transaction and commits it
/// - **Schema** (`schema.rs`): the table registry and bootstrap helpers
///
/// ## Resource lifecycle
///
/// `query` and `execute` open their own session and release it before
/// returning, on every path. Schema helpers work on a caller-owned client.
pub mod connection;
pub mod mutation;
pub mod query;
pub mod schema;

pub use connection::*;
pub use mutation::*;
pub use query::*;
pub use schema::*;
