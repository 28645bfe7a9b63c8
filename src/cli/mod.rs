mod history;
use clap::{Parser, Subcommand};
use data_vault::{Config, Vault, VaultError};
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(version, about, author)]
pub struct Cli {
    /// Root directory of the vault (overrides the config file)
    #[clap(long, env = "DATA_VAULT_DIR", global = true)]
    pub vault_dir: Option<PathBuf>,

    /// Path to a TOML config file
    #[clap(long, env = "DATA_VAULT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a file to the vault as a new version
    #[clap(name = "add", aliases = &["a", "upload"])]
    Add {
        /// File to add; its file name becomes the name in the vault
        #[clap(value_parser)]
        path: PathBuf,
    },

    /// List stored files and their version counts
    #[clap(name = "list", aliases = &["ls", "l"])]
    List,

    /// Show the version history of a file
    #[clap(name = "log", aliases = &["history", "versions"])]
    Log {
        #[clap(value_parser)]
        name: String,
    },

    /// Make an older (or newer) version of a file current
    #[clap(name = "rollback", aliases = &["rb"])]
    Rollback {
        #[clap(value_parser)]
        name: String,

        /// Version number as shown by `log` (starting at 1)
        #[clap(value_parser)]
        version: i64,
    },

    /// Write the current version of a file to a path
    #[clap(name = "export", aliases = &["download", "get"])]
    Export {
        #[clap(value_parser)]
        name: String,

        /// Destination file, or a directory to export into
        #[clap(value_parser)]
        destination: PathBuf,
    },

    /// Delete a file and all of its versions
    #[clap(name = "delete", aliases = &["rm", "del"])]
    Delete {
        #[clap(value_parser)]
        name: String,

        /// Don't ask for confirmation
        #[clap(long, short)]
        yes: bool,
    },

    /// Check every stored version of a file against its recorded size and hash
    #[clap(name = "verify")]
    Verify {
        #[clap(value_parser)]
        name: String,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config, String> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_file(path)?,
            None => Config::default(),
        };
        if let Some(dir) = &self.vault_dir {
            config.vault_dir.clone_from(dir);
        }
        Ok(config)
    }

    pub fn run(self) -> Result<(), String> {
        let config = self.load_config()?;
        tracing::debug!("Using vault at {}", config.vault_dir.display());
        let mut vault = Vault::open(config).map_err(|e| e.to_string())?;

        tracing::trace!("Running command: {:?}", self.command);
        match self.command {
            Commands::Add { path } => {
                let added = vault.add_file(&path).map_err(|e| e.to_string())?;
                println!("{added}");
                Ok(())
            }
            Commands::List => {
                let files = vault.list_files();
                if files.is_empty() {
                    println!("Vault is empty");
                }
                for file in files {
                    println!("{} ({} versions)", file.name, file.version_count);
                }
                Ok(())
            }
            Commands::Log { name } => {
                let versions = vault.list_versions(&name);
                if versions.is_empty() {
                    return Err(format!("File '{name}' not found"));
                }
                let current = vault.current_version_index(&name);
                print!(
                    "{}",
                    history::History {
                        name: &name,
                        versions: &versions,
                        current,
                    }
                );
                Ok(())
            }
            Commands::Rollback { name, version } => {
                // Versions are shown 1-based, the vault takes an index
                let rolled = vault
                    .rollback(&name, version.saturating_sub(1))
                    .map_err(|e| rollback_error(version, &e))?;
                println!("{rolled}");
                Ok(())
            }
            Commands::Export { name, destination } => {
                let exported = vault
                    .export_current(&name, &destination)
                    .map_err(|e| e.to_string())?;
                println!("{exported}");
                Ok(())
            }
            Commands::Delete { name, yes } => {
                if !yes && !confirm(&format!("Delete '{name}' and all versions?"))? {
                    println!("Aborted");
                    return Ok(());
                }
                let deleted = vault.delete_file(&name).map_err(|e| e.to_string())?;
                println!("{deleted}");
                Ok(())
            }
            Commands::Verify { name } => {
                let reports = vault.verify(&name).map_err(|e| e.to_string())?;
                let mut failed = 0usize;
                for report in &reports {
                    let status = if report.is_ok() {
                        "ok"
                    } else if !report.present {
                        "missing"
                    } else if !report.size_matches {
                        "size mismatch"
                    } else {
                        "hash mismatch"
                    };
                    if !report.is_ok() {
                        failed += 1;
                    }
                    println!("Version {}: {status}", report.version);
                }
                if failed > 0 {
                    return Err(format!(
                        "{failed} of {} versions of '{name}' failed verification",
                        reports.len()
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Reports a bad index as the version number the user typed
fn rollback_error(version: i64, e: &VaultError) -> String {
    match e {
        VaultError::InvalidIndex { count, .. } => {
            format!("Invalid version {version} (file has versions 1 to {count})")
        }
        other => other.to_string(),
    }
}

/// Asks a yes/no question on stdin, defaulting to no
fn confirm(question: &str) -> Result<bool, String> {
    print!("{question} [y/N] ");
    std::io::stdout()
        .flush()
        .map_err(|e| format!("Failed to write prompt: {e}"))?;

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|e| format!("Failed to read answer: {e}"))?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "Yes"))
}
