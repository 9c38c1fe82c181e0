use clap::Parser;
use std::path::PathBuf;

use crate::config::PartialConfig;

#[derive(Parser, Debug)]
#[command(name = "conductor", version, about = "Supervisor/worker agent dispatch service")]
pub struct Cli {
    /// Address to bind the inbound API on (e.g. "127.0.0.1:8000")
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Local inference server base URL
    #[arg(long)]
    pub ollama_url: Option<String>,

    /// Default model category ("main", "fast", "smart", "vision", "code", "reason")
    #[arg(short, long)]
    pub model: Option<String>,

    /// Path to config file (overrides default search)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for screenshot output
    #[arg(long)]
    pub screenshot_dir: Option<PathBuf>,

    /// Supervisor instruction file (skills)
    #[arg(long)]
    pub skills: Option<PathBuf>,
}

impl Cli {
    /// Convert CLI arguments to a PartialConfig for merging.
    pub fn to_partial(&self) -> PartialConfig {
        PartialConfig {
            bind_addr: self.bind.clone(),
            ollama_base_url: self.ollama_url.clone(),
            default_category: self.model.clone(),
            screenshot_dir: self.screenshot_dir.clone(),
            skills_path: self.skills.clone(),
            ..Default::default()
        }
    }
}
