// ABOUTME: Command-line interface definitions using clap
// ABOUTME: Defines the subcommands, global flags and credential overrides

use crate::config::{Credentials, DEFAULT_CONFIG_FILE, DEFAULT_CREDENTIALS_FILE};
use clap::{Args, Parser, Subcommand};
use std::fmt;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "crossblog")]
#[command(about = "Cross-publish posts between Blogger and Markdown directories", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file with sources and destinations
    #[arg(long, global = true, env = "CROSSBLOG_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Credentials file (refresh tokens are written back here)
    #[arg(long, global = true, env = "CROSSBLOG_CREDENTIALS", default_value = DEFAULT_CREDENTIALS_FILE)]
    pub credentials_file: PathBuf,

    /// Log filter, e.g. `debug` or `crossblog=trace`
    #[arg(long, global = true, env = "CROSSBLOG_LOG", default_value = "info")]
    pub log_level: String,

    /// Pull but do not push
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(flatten)]
    pub secrets: SecretArgs,
}

/// Overrides for values in the credentials file.
#[derive(Args, Clone, Default)]
pub struct SecretArgs {
    #[arg(long, global = true, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    #[arg(long, global = true, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: Option<String>,

    #[arg(long, global = true, env = "GOOGLE_REFRESH_TOKEN", hide_env_values = true)]
    pub google_refresh_token: Option<String>,

    /// "openai" or "ollama"
    #[arg(long, global = true, env = "LLM_PROVIDER")]
    pub llm_provider: Option<String>,

    #[arg(long, global = true, env = "LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    #[arg(long, global = true, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    #[arg(long, global = true, env = "LLM_MODEL")]
    pub llm_model: Option<String>,
}

impl SecretArgs {
    pub fn into_credentials(self) -> Credentials {
        Credentials {
            google_client_id: self.google_client_id,
            google_client_secret: self.google_client_secret,
            google_refresh_token: self.google_refresh_token,
            llm_provider: self.llm_provider,
            llm_base_url: self.llm_base_url,
            llm_api_key: self.llm_api_key,
            llm_model: self.llm_model,
        }
    }
}

impl fmt::Debug for SecretArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.clone().into_credentials(), f)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Pull one post from a source and push it to destinations
    Publish {
        /// Configured source name
        source: String,
        /// Post URL (Blogger) or file path (Markdown)
        specifier: String,
        /// Configured destination names
        #[arg(required = true)]
        destinations: Vec<String>,
    },

    /// Poll a source for new posts and push them to destinations
    Watch {
        /// Configured source name
        source: String,
        /// Configured destination names
        #[arg(required = true)]
        destinations: Vec<String>,
    },

    /// Run the OAuth consent flow and store the refresh token
    Auth,
}
