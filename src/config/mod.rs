pub mod merge;
pub mod schema;

pub use schema::*;

use anyhow::Context;
use std::path::Path;

use crate::cli::Cli;

/// Load configuration by merging CLI, environment, and global config sources.
/// Precedence: CLI > environment > global config > defaults.
///
/// Missing config files are handled gracefully (defaults apply).
pub fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    // Layer 1: Global config (~/.config/conductor/conductor.toml or platform equivalent),
    // or an explicit --config path.
    let global = match &cli.config {
        Some(path) => load_toml_file(path).unwrap_or_default(),
        None => load_global_config(),
    };

    // Layer 2: Environment (OLLAMA_BASE_URL, DEFAULT_MODEL, ZAI_API_KEY, ...).
    let env = merge::env_partial();

    // Layer 3: CLI args.
    let cli_partial = cli.to_partial();

    Ok(cli_partial.with_fallback(env).with_fallback(global).finalize())
}

/// Load global config from the platform-specific config directory.
/// Returns empty PartialConfig if file not found.
fn load_global_config() -> PartialConfig {
    match global_config_path() {
        Some(p) => load_toml_file(&p).unwrap_or_default(),
        None => {
            tracing::debug!("Could not determine global config directory");
            PartialConfig::default()
        }
    }
}

/// Load and parse a TOML config file into a PartialConfig.
/// Returns None on file-not-found; logs and returns None on parse errors.
fn load_toml_file(path: &Path) -> Option<PartialConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            match toml::from_str::<ConfigFile>(&contents)
                .context(format!("Failed to parse {}", path.display()))
            {
                Ok(config_file) => {
                    tracing::info!("Loaded config from {}", path.display());
                    Some(config_file.to_partial())
                }
                Err(e) => {
                    tracing::warn!("Config parse error: {:#}", e);
                    None
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read config at {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the platform-specific global config path.
/// Linux: ~/.config/conductor/conductor.toml
/// macOS: ~/Library/Application Support/conductor/conductor.toml
fn global_config_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("", "", "conductor")
        .map(|dirs| dirs.config_dir().join("conductor.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn toml_file_round_trips_through_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nbind_addr = \"0.0.0.0:9100\"\n\n[models]\ndefault_category = \"fast\"\n"
        )
        .unwrap();

        let partial = load_toml_file(file.path()).unwrap();
        assert_eq!(partial.bind_addr.as_deref(), Some("0.0.0.0:9100"));
        assert_eq!(partial.default_category.as_deref(), Some("fast"));
        assert!(partial.ollama_base_url.is_none());
    }

    #[test]
    fn missing_toml_file_yields_none() {
        assert!(load_toml_file(Path::new("/nonexistent/conductor.toml")).is_none());
    }
}
