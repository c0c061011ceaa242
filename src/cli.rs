//! Command-line driver: argument parsing and command dispatch.
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::config;
use crate::core::db::{self, ColumnSpec, Credentials, MutationOutcome, QueryOutcome, StatementType};
use crate::core::{HospdbError, Result};
use crate::logging;

pub const USAGE: &str = "\
Usage: hospdb [--config PATH] <command> [args]

Commands:
  bootstrap                 create all analysis tables (referenced tables first)
  drop [TABLE...]           drop the given tables with CASCADE (default: all)
  tables                    list analysis tables present in the database
  query SQL                 run a query and print the rows as JSON
  exec SQL                  run a statement, commit, and print the affected rows
  run SQL                   `query` or `exec`, chosen by the statement's leading keyword
  insert-hospital NCODI NAME
                            insert one row into hospitales
  help                      show this message";

/// Exit status for a command that could not reach the database.
pub const EXIT_CONNECTION_FAILED: i32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Bootstrap,
    Drop(Vec<String>),
    Tables,
    Query(String),
    Exec(String),
    Run(String),
    InsertHospital { ncodi: i32, name: String },
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cli {
    pub config: Option<PathBuf>,
    pub command: Command,
}

fn single_argument(command: &str, rest: Vec<String>) -> Result<String> {
    match <[String; 1]>::try_from(rest) {
        Ok([sql]) => Ok(sql),
        Err(_) => Err(HospdbError::Command(format!("`{}` takes exactly one SQL argument", command))),
    }
}

impl Cli {
    /// Parses arguments (without the program name).
    pub fn parse<I>(args: I) -> Result<Cli>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter().peekable();
        let mut config = None;

        if args.peek().map(String::as_str) == Some("--config") {
            args.next();
            let path = args
                .next()
                .ok_or_else(|| HospdbError::Command("--config requires a path".to_string()))?;
            config = Some(PathBuf::from(path));
        }

        let name = args.next().unwrap_or_else(|| "help".to_string());
        let rest: Vec<String> = args.collect();

        let command = match name.as_str() {
            "bootstrap" => Command::Bootstrap,
            "drop" => Command::Drop(rest),
            "tables" => Command::Tables,
            "query" => Command::Query(single_argument("query", rest)?),
            "exec" => Command::Exec(single_argument("exec", rest)?),
            "run" => Command::Run(single_argument("run", rest)?),
            "insert-hospital" => match <[String; 2]>::try_from(rest) {
                Ok([ncodi, name]) => Command::InsertHospital {
                    ncodi: ncodi
                        .parse()
                        .map_err(|_| HospdbError::Command(format!("NCODI must be an integer, got {:?}", ncodi)))?,
                    name,
                },
                Err(_) => {
                    return Err(HospdbError::Command(
                        "`insert-hospital` takes NCODI and NAME".to_string(),
                    ))
                }
            },
            "help" | "--help" | "-h" => Command::Help,
            other => return Err(HospdbError::Command(format!("unknown command: {}", other))),
        };

        Ok(Cli { config, command })
    }
}

fn connection_failed(failure: &db::ConnectFailure) -> Result<i32> {
    eprintln!("could not connect to the database: {}", failure);
    Ok(EXIT_CONNECTION_FAILED)
}

fn print_rows(out: &mut dyn Write, outcome: QueryOutcome) -> Result<i32> {
    match outcome {
        QueryOutcome::Rows(result) => {
            let records = serde_json::to_string_pretty(&result.to_records())?;
            writeln!(out, "{}", records)?;
            Ok(0)
        }
        QueryOutcome::ConnectionFailed(failure) => connection_failed(&failure),
    }
}

fn print_mutation(out: &mut dyn Write, outcome: MutationOutcome) -> Result<i32> {
    match outcome {
        MutationOutcome::Committed { rows_affected } => {
            writeln!(out, "{} rows affected", rows_affected)?;
            Ok(0)
        }
        MutationOutcome::ConnectionFailed(failure) => connection_failed(&failure),
    }
}

/// Runs a schema command over one session, closing it afterwards.
fn with_session<F>(credentials: &Credentials, work: F) -> Result<i32>
where
    F: FnOnce(&mut postgres::Client) -> Result<()>,
{
    let mut session = match db::try_connect(credentials) {
        Ok(session) => session,
        Err(failure) => return connection_failed(&failure),
    };
    work(session.client())?;
    session.close()?;
    Ok(0)
}

/// Executes a parsed command, writing results to `out`. Returns the exit status.
pub fn execute_command(command: Command, credentials: &Credentials, out: &mut dyn Write) -> Result<i32> {
    let database = credentials.database.clone();
    match command {
        Command::Help => {
            writeln!(out, "{}", USAGE)?;
            Ok(0)
        }
        Command::Bootstrap => with_session(credentials, db::create_all),
        Command::Drop(tables) if tables.is_empty() => with_session(credentials, db::drop_all),
        Command::Drop(tables) => with_session(credentials, |client| db::drop_tables(client, tables.as_slice())),
        Command::Tables => {
            let mut names = Vec::new();
            let status = with_session(credentials, |client| {
                names = db::existing_tables(client)?;
                Ok(())
            })?;
            for name in names {
                writeln!(out, "{}", name)?;
            }
            Ok(status)
        }
        Command::Query(sql) => print_rows(out, db::query(&database, credentials, &sql, ColumnSpec::FromQuery)?),
        Command::Exec(sql) => print_mutation(out, db::execute(&database, credentials, &sql)?),
        Command::Run(sql) => {
            if StatementType::from_sql(&sql).returns_rows() {
                print_rows(out, db::query(&database, credentials, &sql, ColumnSpec::FromQuery)?)
            } else {
                print_mutation(out, db::execute(&database, credentials, &sql)?)
            }
        }
        Command::InsertHospital { ncodi, name } => {
            with_session(credentials, |client| db::insert_hospital(client, ncodi, &name))
        }
    }
}

/// Entry point used by the binary. Returns the process exit status.
pub fn main_with_args<I>(args: I) -> i32
where
    I: IntoIterator<Item = String>,
{
    let cli = match Cli::parse(args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            return 1;
        }
    };

    let mut stdout = std::io::stdout();
    if cli.command == Command::Help {
        return match writeln!(stdout, "{}", USAGE) {
            Ok(()) => 0,
            Err(_) => 1,
        };
    }

    let result = config::load(cli.config.as_deref()).and_then(|config| {
        logging::init(config.log_level());
        let credentials = config.database.credentials()?;
        info!(target_db = %credentials.target(), command = ?cli.command, "running command");
        execute_command(cli.command, &credentials, &mut stdout)
    });

    match result {
        Ok(status) => status,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Cli::parse(args(&["bootstrap"])).unwrap().command, Command::Bootstrap);
        assert_eq!(Cli::parse(args(&["drop"])).unwrap().command, Command::Drop(vec![]));
        assert_eq!(
            Cli::parse(args(&["drop", "gastos", "ingresos"])).unwrap().command,
            Command::Drop(args(&["gastos", "ingresos"]))
        );
        assert_eq!(
            Cli::parse(args(&["query", "SELECT 1 AS x"])).unwrap().command,
            Command::Query("SELECT 1 AS x".to_string())
        );
        assert_eq!(
            Cli::parse(args(&["insert-hospital", "42", "Hospital Central"])).unwrap().command,
            Command::InsertHospital {
                ncodi: 42,
                name: "Hospital Central".to_string()
            }
        );
        assert_eq!(Cli::parse(Vec::new()).unwrap().command, Command::Help);
    }

    #[test]
    fn test_parse_config_flag() {
        let cli = Cli::parse(args(&["--config", "/etc/hospdb.toml", "tables"])).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/hospdb.toml")));
        assert_eq!(cli.command, Command::Tables);

        assert!(matches!(Cli::parse(args(&["--config"])), Err(HospdbError::Command(_))));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Cli::parse(args(&["frobnicate"])).is_err());
        assert!(Cli::parse(args(&["query"])).is_err());
        assert!(Cli::parse(args(&["exec", "UPDATE a", "UPDATE b"])).is_err());
        assert!(Cli::parse(args(&["insert-hospital", "abc", "x"])).is_err());
        assert!(Cli::parse(args(&["insert-hospital", "1"])).is_err());
    }

    #[test]
    fn test_help_writes_usage() {
        let creds = Credentials::new("db", "user", "pw", "127.0.0.1", 1);
        let mut out = Vec::new();
        let status = execute_command(Command::Help, &creds, &mut out).unwrap();
        assert_eq!(status, 0);
        assert!(String::from_utf8(out).unwrap().starts_with("Usage: hospdb"));
    }

    #[test]
    fn test_query_without_server_reports_connection_failure() {
        let creds = Credentials::new("db", "user", "pw", "127.0.0.1", 1)
            .with_connect_timeout(std::time::Duration::from_secs(2));
        let mut out = Vec::new();
        let status = execute_command(Command::Query("SELECT 1".to_string()), &creds, &mut out).unwrap();
        assert_eq!(status, EXIT_CONNECTION_FAILED);
        assert!(out.is_empty());
    }
}
