/// Mutation Execution Module
///
/// Runs statements that produce no result rows (UPDATE, ALTER, INSERT, ...)
/// inside a transaction and commits it. A transaction that is dropped
/// before `commit` rolls back, so a failing statement leaves nothing open.

use postgres::Client;
use tracing::debug;

use super::connection::{release, try_connect, ConnectFailure, Credentials};
use crate::core::{HospdbError, Result};

/// Outcome of `execute`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The statement ran and its transaction committed
    Committed { rows_affected: u64 },
    /// No connection could be opened; nothing was attempted
    ConnectionFailed(ConnectFailure),
}

impl MutationOutcome {
    /// True when nothing ran because the connection failed.
    pub fn is_noop(&self) -> bool {
        matches!(self, MutationOutcome::ConnectionFailed(_))
    }

    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            MutationOutcome::Committed { rows_affected } => Some(*rows_affected),
            MutationOutcome::ConnectionFailed(_) => None,
        }
    }

    /// The affected row count, or the connection failure as an error.
    pub fn into_result(self) -> Result<u64> {
        match self {
            MutationOutcome::Committed { rows_affected } => Ok(rows_affected),
            MutationOutcome::ConnectionFailed(failure) => Err(HospdbError::Connection(failure)),
        }
    }
}

/// Transactional statement execution over a borrowed client
pub struct MutationExecutor<'a> {
    client: &'a mut Client,
}

impl<'a> MutationExecutor<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        MutationExecutor { client }
    }

    /// Executes one statement and commits, returning the affected row count.
    pub fn execute(&mut self, sql: &str) -> Result<u64> {
        let mut transaction = self.client.transaction()?;
        let rows_affected = transaction.execute(sql, &[])?;
        transaction.commit()?;
        debug!(rows_affected, "mutation committed");
        Ok(rows_affected)
    }

    /// Executes one or more `;`-separated statements in a single transaction.
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        let mut transaction = self.client.transaction()?;
        transaction.batch_execute(sql)?;
        transaction.commit()?;
        debug!("batch committed");
        Ok(())
    }
}

/// Opens a connection to `database`, runs `sql`, commits, and closes.
///
/// A failed connection yields `MutationOutcome::ConnectionFailed` and
/// nothing runs. SQL faults propagate after the transaction is rolled back
/// and the connection released.
pub fn execute(database: &str, credentials: &Credentials, sql: &str) -> Result<MutationOutcome> {
    let mut session = match try_connect(&credentials.with_database(database)) {
        Ok(session) => session,
        Err(failure) => return Ok(MutationOutcome::ConnectionFailed(failure)),
    };

    let rows_affected = MutationExecutor::new(session.client()).execute(sql)?;
    release(session);
    Ok(MutationOutcome::Committed { rows_affected })
}
