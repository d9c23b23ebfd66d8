use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub method: Option<String>,
    pub params: serde_json::Value,
    pub wrapped: bool,
    pub tolerant: bool,
    pub log_file: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Parser, Debug)]
#[command(name = "stdio-service")]
#[command(about = "Talk to a line-delimited JSON backend over stdio", long_about = None)]
pub struct Cli {
    /// Backend executable
    pub program: String,
    /// Arguments passed to the backend
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
    /// Working directory for the backend
    #[arg(long)]
    pub cwd: Option<PathBuf>,
    /// Send one request with this method and print its result
    #[arg(long)]
    pub method: Option<String>,
    /// JSON params for --method
    #[arg(long, default_value = "null")]
    pub params: String,
    /// Wrap every message in a single-element array
    #[arg(long)]
    pub wrapped: bool,
    /// Treat malformed backend output as plain output instead of faults
    #[arg(long)]
    pub tolerant: bool,
    /// Mirror all traffic to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn into_config(self) -> anyhow::Result<Config> {
        let params = serde_json::from_str(&self.params)
            .map_err(|e| anyhow::anyhow!("--params is not valid JSON: {}", e))?;
        Ok(Config {
            program: self.program,
            args: self.args,
            working_dir: self.cwd,
            method: self.method,
            params,
            wrapped: self.wrapped,
            tolerant: self.tolerant,
            log_file: self.log_file,
        })
    }
}
