//! Shared fixtures for tests that need a live PostgreSQL server.
//!
//! Set `HOSPDB_TEST_HOST`, `HOSPDB_TEST_PORT`, `HOSPDB_TEST_USER`,
//! `HOSPDB_TEST_PASSWORD` and `HOSPDB_TEST_DATABASE` to run them; without
//! those variables the live tests return early.
#![allow(dead_code)]

use hospdb::Credentials;
use std::time::Duration;
use uuid::Uuid;

/// Credentials for a port nothing listens on.
pub fn unreachable_credentials() -> Credentials {
    Credentials::new("hospitales_db", "analyst", "secret", "127.0.0.1", 1)
        .with_connect_timeout(Duration::from_secs(2))
}

fn server_credentials() -> Option<Credentials> {
    let var = |name: &str| std::env::var(format!("HOSPDB_TEST_{}", name)).ok();
    let port = var("PORT").map(|p| p.parse().expect("HOSPDB_TEST_PORT must be a port"))?;
    Some(
        Credentials::new(var("DATABASE")?, var("USER")?, var("PASSWORD")?, var("HOST")?, port)
            .with_connect_timeout(Duration::from_secs(10)),
    )
}

/// A throwaway schema on the test server; dropped with everything in it.
pub struct TestSchema {
    pub name: String,
    /// Credentials whose sessions resolve unqualified names in this schema
    pub credentials: Credentials,
    server: Credentials,
}

impl TestSchema {
    pub fn create() -> Option<TestSchema> {
        let server = server_credentials()?;
        let name = format!("hospdb_test_{}", Uuid::new_v4().simple());

        let mut session = hospdb::connect(&server).expect("test server should accept the configured credentials");
        session
            .client()
            .batch_execute(&format!("CREATE SCHEMA {}", name))
            .expect("failed to create test schema");
        session.close().unwrap();

        let credentials = server.clone().with_search_path(name.as_str());
        Some(TestSchema {
            name,
            credentials,
            server,
        })
    }

    /// A fresh schema with all analysis tables created.
    pub fn bootstrapped() -> Option<TestSchema> {
        let schema = TestSchema::create()?;
        let mut session = schema.session();
        hospdb::core::db::create_all(session.client()).expect("bootstrap failed");
        session.close().unwrap();
        Some(schema)
    }

    pub fn database(&self) -> &str {
        &self.credentials.database
    }

    /// Opens a session scoped to this schema.
    pub fn session(&self) -> hospdb::Session {
        hospdb::connect(&self.credentials).expect("test server unreachable")
    }

    /// Credentials for the same server with a wrong password.
    pub fn wrong_password(&self) -> Credentials {
        let mut credentials = self.credentials.clone();
        credentials.password = format!("{}-wrong", credentials.password);
        credentials
    }
}

impl Drop for TestSchema {
    fn drop(&mut self) {
        if let Some(mut session) = hospdb::connect(&self.server) {
            let _ = session
                .client()
                .batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.name));
        }
    }
}

/// Returns early from a test when no live server is configured.
///
/// `require_server!(bootstrapped)` also creates every analysis table.
#[macro_export]
macro_rules! require_server {
    () => {
        match common::TestSchema::create() {
            Some(schema) => schema,
            None => {
                eprintln!("HOSPDB_TEST_* not set; skipping live database test");
                return;
            }
        }
    };
    (bootstrapped) => {
        match common::TestSchema::bootstrapped() {
            Some(schema) => schema,
            None => {
                eprintln!("HOSPDB_TEST_* not set; skipping live database test");
                return;
            }
        }
    };
}
