///
/// Subcommands and their execution against an open database.
///

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde_json::{Value, json};

use cozo_binding::{Db, Map, ScriptMutability};

use crate::errors::CliError;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a CozoScript query
    Run {
        /// Script text
        script: Option<String>,

        /// Read the script from a file
        #[arg(long, short, conflicts_with = "script")]
        file: Option<PathBuf>,

        /// Query parameters as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Reject mutations
        #[arg(long)]
        immutable: bool,
    },

    /// Export stored relations as JSON
    Export {
        /// Relations to export
        #[arg(required = true)]
        relations: Vec<String>,

        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Import relations from a JSON file produced by `export`
    Import {
        /// Exported relations file
        file: PathBuf,
    },

    /// Back up the database to a file
    Backup {
        /// Output path
        out: String,
    },

    /// Restore a backup into an empty database
    Restore {
        /// Backup path
        input: String,
    },

    /// Copy selected relations out of a backup
    ImportBackup {
        /// Backup path
        backup: String,

        /// Relations to copy
        #[arg(required = true)]
        relations: Vec<String>,
    },
}

/// Execute `command`; returns the JSON document to print, if any.
pub fn execute(command: Command, db: &Db) -> Result<Option<Value>, CliError> {
    match command {
        Command::Run {
            script,
            file,
            params,
            immutable,
        } => {
            let script = read_script(script, file.as_deref())?;
            let params = params.as_deref().map(parse_params).transpose()?;
            let mutability = if immutable {
                ScriptMutability::Immutable
            } else {
                ScriptMutability::Mutable
            };
            let rows = db.run_script(&script, params.as_ref(), mutability)?;
            Ok(Some(to_json(&rows)?))
        }
        Command::Export { relations, output } => {
            let data = db.export_relations(&relations)?;
            match output {
                Some(path) => {
                    write_json(&path, &Value::Object(data))?;
                    Ok(None)
                }
                None => Ok(Some(Value::Object(data))),
            }
        }
        Command::Import { file } => {
            let payload = read_json_object(&file)?;
            db.import_relations(&payload)?;
            Ok(Some(json!({"ok": true})))
        }
        Command::Backup { out } => {
            db.backup(&out)?;
            Ok(Some(json!({"ok": true, "path": out})))
        }
        Command::Restore { input } => {
            db.restore(&input)?;
            Ok(Some(json!({"ok": true})))
        }
        Command::ImportBackup { backup, relations } => {
            db.import_from_backup(&backup, &relations)?;
            Ok(Some(json!({"ok": true})))
        }
    }
}

fn read_script(script: Option<String>, file: Option<&Path>) -> Result<String, CliError> {
    match (script, file) {
        (Some(script), _) => Ok(script),
        (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| CliError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
        (None, None) => Err(CliError::MissingScript),
    }
}

fn parse_params(text: &str) -> Result<Map, CliError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CliError::InvalidJson {
            what: "params",
            reason: "expected a JSON object".to_string(),
        }),
        Err(e) => Err(CliError::InvalidJson {
            what: "params",
            reason: e.to_string(),
        }),
    }
}

fn read_json_object(path: &Path) -> Result<Map, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CliError::InvalidJson {
            what: "relations file",
            reason: "expected a JSON object".to_string(),
        }),
        Err(e) => Err(CliError::InvalidJson {
            what: "relations file",
            reason: e.to_string(),
        }),
    }
}

fn write_json(path: &Path, value: &Value) -> Result<(), CliError> {
    let text = to_pretty(value)?;
    std::fs::write(path, text).map_err(|e| CliError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, CliError> {
    serde_json::to_value(value).map_err(|e| CliError::InvalidJson {
        what: "result",
        reason: e.to_string(),
    })
}

pub fn to_pretty(value: &Value) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::InvalidJson {
        what: "output",
        reason: e.to_string(),
    })
}
