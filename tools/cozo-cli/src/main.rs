///
/// cozo CLI - command-line access to libcozo_c through cozo-binding
///
/// Opens the database described by `cozo.toml` (or by flags) and runs one
/// command against it:
/// - cozo run <script>: run CozoScript, print rows as JSON
/// - cozo export <rel>...: print or save relation data
/// - cozo import <file>: load relation data produced by export
/// - cozo backup <out> / cozo restore <in>
/// - cozo import-backup <path> <rel>...
///

mod commands;
mod errors;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use cozo_binding::{BindingConfig, Engine, StorageEngine};

use commands::Command;
use errors::CliError;

#[derive(Debug, Parser)]
#[command(name = "cozo")]
#[command(author, version, about = "Run CozoScript against the Cozo C library", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to libcozo_c (defaults to the config, then COZO_C_LIB)
    #[arg(long, global = true)]
    lib: Option<PathBuf>,

    /// Storage engine (mem, sqlite, rocksdb, sled, tikv, or any kind the library accepts)
    #[arg(long, global = true)]
    engine: Option<StorageEngine>,

    /// Database path
    #[arg(long = "path", global = true)]
    db_path: Option<String>,

    /// Log to stderr (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(level)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = resolve_config(&cli)?;
    let engine = load_engine(&config)?;
    let db = config.open(&engine)?;
    tracing::debug!(db = db.id(), engine = %config.database.engine, "database ready");

    let output = commands::execute(cli.command, &db);
    db.close();

    if let Some(value) = output? {
        println!("{}", commands::to_pretty(&value)?);
    }
    Ok(())
}

/// Config file (or defaults) with command-line overrides applied.
fn resolve_config(cli: &Cli) -> Result<BindingConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => BindingConfig::load(path)?,
        None => BindingConfig::default(),
    };
    if let Some(lib) = &cli.lib {
        config.library.path = Some(lib.clone());
    }
    if let Some(engine) = &cli.engine {
        config.database.engine = engine.clone();
    }
    if let Some(path) = &cli.db_path {
        config.database.path = path.clone();
    }
    Ok(config)
}

fn load_engine(config: &BindingConfig) -> Result<Engine, CliError> {
    match config.library_path() {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading engine library");
            Ok(unsafe { Engine::load(&path) }?)
        }
        #[cfg(feature = "linked")]
        None => Ok(Engine::linked()),
        #[cfg(not(feature = "linked"))]
        None => Err(cozo_binding::LoadError::NotConfigured {
            var: cozo_binding::LIBRARY_ENV_VAR,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "cozo",
            "--engine",
            "sqlite",
            "--path",
            "app.db",
            "run",
            "?[a] <- [[1]]",
            "--immutable",
        ])
        .expect("Failed to parse args");

        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.database.engine, StorageEngine::Sqlite);
        assert_eq!(config.database.path, "app.db");

        match cli.command {
            Command::Run {
                script, immutable, ..
            } => {
                assert_eq!(script.as_deref(), Some("?[a] <- [[1]]"));
                assert!(immutable);
            }
            other => panic!("Expected run command, got {other:?}"),
        }
    }

    #[test]
    fn test_unnamed_engine_is_passed_through() {
        let cli = Cli::try_parse_from(["cozo", "--engine", "newrocksdb", "backup", "out.db"]).unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(
            config.database.engine,
            StorageEngine::Other("newrocksdb".to_string())
        );

        assert!(Cli::try_parse_from(["cozo", "--engine", "", "backup", "out.db"]).is_err());
    }

    #[test]
    fn test_export_requires_relations() {
        assert!(Cli::try_parse_from(["cozo", "export"]).is_err());

        let cli = Cli::try_parse_from(["cozo", "export", "s", "t", "-o", "out.json"]).unwrap();
        match cli.command {
            Command::Export { relations, output } => {
                assert_eq!(relations, vec!["s", "t"]);
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            other => panic!("Expected export command, got {other:?}"),
        }
    }

    #[test]
    fn test_import_backup_subcommand_name() {
        let cli = Cli::try_parse_from(["cozo", "import-backup", "test.db", "s"]).unwrap();
        assert!(matches!(cli.command, Command::ImportBackup { .. }));
    }

    #[test]
    fn test_config_file_then_flag_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cozo.toml");
        std::fs::write(
            &path,
            "[library]\npath = \"/opt/libcozo_c.so\"\n\n[database]\nengine = \"sqlite\"\npath = \"a.db\"\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "cozo",
            "--config",
            path.to_str().unwrap(),
            "--path",
            "b.db",
            "restore",
            "backup.db",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.library.path, Some(PathBuf::from("/opt/libcozo_c.so")));
        assert_eq!(config.database.engine, StorageEngine::Sqlite);
        assert_eq!(config.database.path, "b.db");
    }

    #[test]
    fn test_missing_config_file() {
        let cli = Cli::try_parse_from(["cozo", "--config", "/nonexistent/cozo.toml", "backup", "x"])
            .unwrap();
        let err = resolve_config(&cli).unwrap_err();
        assert!(err.to_string().contains("Config not found"));
    }
}
