/// Schema Bootstrap Module
///
/// The fixed set of analysis tables, kept as a read-only registry of
/// `CREATE TABLE` statements in dependency order, plus helpers to create,
/// drop and seed them. Every helper here runs over a caller-owned client
/// and commits its own statement; none of them opens or closes connections.

use once_cell::sync::Lazy;
use postgres::Client;
use regex::Regex;
use tracing::info;

use super::mutation::MutationExecutor;
use crate::core::{HospdbError, Result};

pub const HOSPITALS: &str = "hospitales";
pub const HOSPITALIZATION_TYPES: &str = "tipo_hospitalizacion";
pub const EXPENSES: &str = "gastos";
pub const INCOME: &str = "ingresos";

/// Expense category columns of `gastos`, in on-disk order.
pub const EXPENSE_COLUMNS: &[&str] = &[
    "totalcompra",
    "producfarma",
    "materialsani",
    "implantes",
    "restomateriasani",
    "servcontratado",
    "trabajocontratado",
    "xrestocompras",
    "variaexistencias",
    "servexteriores",
    "sumistro",
    "xrestoserviexter",
    "gastopersonal",
    "sueldos",
    "indemnizacion",
    "segsocempresa",
    "otrgassocial",
    "dotaamortizacion",
    "perdidadeterioro",
    "xrestogasto",
    "totcompragasto",
];

/// Income source columns of `ingresos`, in on-disk order.
pub const INCOME_COLUMNS: &[&str] = &[
    "particulares",
    "aseguradoras",
    "aseguradoras_enfermedad",
    "aseguradoras_trafico",
    "mutuas",
];

/// One table of the analysis schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: &'static str,
    /// Tables this one holds foreign keys into
    pub references: &'static [&'static str],
    pub create_sql: String,
}

fn amount_columns(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("    {c} NUMERIC CHECK ({c} >= 0)"))
        .collect::<Vec<_>>()
        .join(",\n")
}

/// All tables, referenced tables first.
static REGISTRY: Lazy<Vec<TableDefinition>> = Lazy::new(|| {
    vec![
        TableDefinition {
            name: HOSPITALS,
            references: &[],
            create_sql: format!(
                "CREATE TABLE IF NOT EXISTS {HOSPITALS} (\n    \
                 ncodi INT PRIMARY KEY,\n    \
                 name VARCHAR(300)\n);"
            ),
        },
        TableDefinition {
            name: HOSPITALIZATION_TYPES,
            references: &[],
            create_sql: format!(
                "CREATE TABLE IF NOT EXISTS {HOSPITALIZATION_TYPES} (\n    \
                 tipo_id SERIAL PRIMARY KEY,\n    \
                 nombre VARCHAR(100) UNIQUE NOT NULL\n);"
            ),
        },
        TableDefinition {
            name: EXPENSES,
            references: &[HOSPITALS],
            create_sql: format!(
                "CREATE TABLE IF NOT EXISTS {EXPENSES} (\n    \
                 gastos_id INT PRIMARY KEY,\n    \
                 anio INT NOT NULL,\n    \
                 ncodi INT REFERENCES {HOSPITALS}(ncodi),\n{}\n);",
                amount_columns(EXPENSE_COLUMNS)
            ),
        },
        TableDefinition {
            name: INCOME,
            references: &[HOSPITALS, HOSPITALIZATION_TYPES],
            create_sql: format!(
                "CREATE TABLE IF NOT EXISTS {INCOME} (\n    \
                 id_ingresos INT PRIMARY KEY,\n    \
                 ncodi INT REFERENCES {HOSPITALS}(ncodi),\n{},\n    \
                 tipo_id INT NOT NULL REFERENCES {HOSPITALIZATION_TYPES}(tipo_id)\n);",
                amount_columns(INCOME_COLUMNS)
            ),
        },
    ]
});

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("identifier pattern is valid")
});

/// The table registry in creation order.
pub fn registry() -> &'static [TableDefinition] {
    &REGISTRY
}

pub fn table(name: &str) -> Option<&'static TableDefinition> {
    REGISTRY.iter().find(|t| t.name == name)
}

/// Table names in creation order.
pub fn creation_order() -> Vec<&'static str> {
    REGISTRY.iter().map(|t| t.name).collect()
}

/// Whether `name` is a plain (optionally schema-qualified) SQL identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Quotes each segment of a validated identifier, folding to lower case the
/// way the server folds unquoted names. Keywords such as `user` stay usable.
fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|segment| format!("\"{}\"", segment.to_lowercase()))
        .collect::<Vec<_>>()
        .join(".")
}

/// Builds the single cascading drop statement for `tables`.
pub fn drop_statement<S: AsRef<str>>(tables: &[S]) -> Result<String> {
    let names: Vec<&str> = tables.iter().map(|t| t.as_ref()).collect();
    if names.is_empty() {
        return Err(HospdbError::Schema("no tables given to drop".to_string()));
    }
    if let Some(bad) = names.iter().find(|t| !is_valid_identifier(t)) {
        return Err(HospdbError::Schema(format!("invalid table name: {:?}", bad)));
    }

    let quoted: Vec<String> = names.iter().map(|t| quote_identifier(t)).collect();
    Ok(format!("DROP TABLE IF EXISTS {} CASCADE;", quoted.join(", ")))
}

/// Runs one table's DDL and commits.
pub fn create_table(client: &mut Client, table: &TableDefinition) -> Result<()> {
    MutationExecutor::new(client).execute_batch(&table.create_sql)?;
    info!(table = table.name, "table created");
    Ok(())
}

fn create_named(client: &mut Client, name: &str) -> Result<()> {
    let definition =
        table(name).ok_or_else(|| HospdbError::Schema(format!("unknown table: {}", name)))?;
    create_table(client, definition)
}

pub fn create_hospitals(client: &mut Client) -> Result<()> {
    create_named(client, HOSPITALS)
}

pub fn create_hospitalization_types(client: &mut Client) -> Result<()> {
    create_named(client, HOSPITALIZATION_TYPES)
}

/// Requires `hospitales` to exist.
pub fn create_expenses(client: &mut Client) -> Result<()> {
    create_named(client, EXPENSES)
}

/// Requires `hospitales` and `tipo_hospitalizacion` to exist.
pub fn create_income(client: &mut Client) -> Result<()> {
    create_named(client, INCOME)
}

/// Creates every registered table, referenced tables first.
pub fn create_all(client: &mut Client) -> Result<()> {
    for definition in registry() {
        create_table(client, definition)?;
    }
    Ok(())
}

/// Drops `tables` in one statement with CASCADE, then commits.
///
/// Names must be plain identifiers; missing tables are ignored.
pub fn drop_tables<S: AsRef<str>>(client: &mut Client, tables: &[S]) -> Result<()> {
    let statement = drop_statement(tables)?;
    MutationExecutor::new(client).execute_batch(&statement)?;
    info!(statement = %statement, "tables dropped");
    Ok(())
}

/// Drops every registered table.
pub fn drop_all(client: &mut Client) -> Result<()> {
    let mut names = creation_order();
    names.reverse();
    drop_tables(client, names.as_slice())
}

/// Registered tables that currently exist in the session's schema.
pub fn existing_tables(client: &mut Client) -> Result<Vec<String>> {
    let names = creation_order();
    let rows = client.query(
        "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name::text = ANY($1::text[])",
        &[&names],
    )?;

    let mut found = Vec::with_capacity(rows.len());
    for row in rows {
        found.push(row.try_get::<_, String>(0)?);
    }
    found.sort_by_key(|name| names.iter().position(|n| n == name));
    Ok(found)
}

/// Inserts one hospital and commits.
///
/// No upsert: an existing `ncodi` fails with a unique violation.
pub fn insert_hospital(client: &mut Client, ncodi: i32, name: &str) -> Result<()> {
    let mut transaction = client.transaction()?;
    transaction.execute(
        "INSERT INTO hospitales (ncodi, name) VALUES ($1, $2)",
        &[&ncodi, &name],
    )?;
    transaction.commit()?;
    Ok(())
}

/// Inserts one hospitalization type and returns its generated id.
pub fn insert_hospitalization_type(client: &mut Client, name: &str) -> Result<i32> {
    let mut transaction = client.transaction()?;
    let row = transaction.query_one(
        "INSERT INTO tipo_hospitalizacion (nombre) VALUES ($1) RETURNING tipo_id",
        &[&name],
    )?;
    let id: i32 = row.try_get(0)?;
    transaction.commit()?;
    Ok(id)
}
