#[cfg_attr(feature = "sequential", allow(dead_code))]
mod parallel;
#[cfg(feature = "sequential")]
mod sequential;

use chrono::Utc;
use clap::Parser;
use eyre::{Context, Result, eyre};
use gemini_chat_export::exporter::{self, OutputFormat, RoleLabels, SourceInfo};
use gemini_chat_export::extract;
use gemini_chat_export::utils::{self, ExportConfig};
use serde::Deserialize;
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Export Gemini chat conversations from saved HTML pages.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Saved chat pages (.html).
    /// Reads one page from stdin and writes to stdout if omitted.
    #[arg(value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Directory to write exported files to.
    /// Defaults to ./gemini-chat-export if not set in config.
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/gemini-chat-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Heading used for your own messages.
    #[arg(long, value_name = "LABEL")]
    user_label: Option<String>,

    /// Heading used for the model's messages.
    #[arg(long, value_name = "LABEL")]
    assistant_label: Option<String>,

    /// Write transcripts to stdout instead of files.
    #[arg(long)]
    stdout: bool,

    /// Print which page-structure selectors match instead of exporting.
    #[arg(long)]
    inspect: bool,

    /// Re-export pages even if they have not changed.
    #[arg(short, long)]
    force: bool,

    /// More log output (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    target_dir: Option<PathBuf>,
    format: Option<OutputFormat>,
    user_label: Option<String>,
    assistant_label: Option<String>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        // Search: XDG/OS config dir, then nothing
        dirs::config_dir()
            .map(|d| d.join("gemini-chat-export/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_logging(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn read_page(input: Option<&Path>) -> Result<Vec<u8>> {
    match input {
        Some(path) => {
            fs::read(path).wrap_err_with(|| format!("Failed to read: {}", path.display()))
        }
        None => {
            let mut bytes = Vec::new();
            io::stdin()
                .read_to_end(&mut bytes)
                .wrap_err("Failed to read stdin")?;
            Ok(bytes)
        }
    }
}

fn page_sources(inputs: &[PathBuf]) -> Vec<Option<&Path>> {
    if inputs.is_empty() {
        vec![None]
    } else {
        inputs.iter().map(|p| Some(p.as_path())).collect()
    }
}

fn print_transcripts(inputs: &[PathBuf], format: OutputFormat, labels: &RoleLabels) -> Result<()> {
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());

    for (i, input) in page_sources(inputs).into_iter().enumerate() {
        let bytes = read_page(input)?;
        let html = String::from_utf8_lossy(&bytes);
        let extraction = extract::extract_html(&html).wrap_err("Failed to extract conversation")?;
        if extraction.is_empty() {
            tracing::warn!("no messages found");
        }
        if i > 0 {
            writeln!(writer)?;
        }
        let hash = input.map(|_| utils::hash_source(&bytes));
        let source = SourceInfo {
            path: input.map(Path::to_path_buf),
            hash,
        };
        exporter::write_transcript(&mut writer, &extraction, format, labels, &source, Utc::now())?;
    }
    writer.flush()?;
    Ok(())
}

fn print_inspection(inputs: &[PathBuf]) -> Result<()> {
    for input in page_sources(inputs) {
        let bytes = read_page(input)?;
        let html = String::from_utf8_lossy(&bytes);
        let name = input.map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string());
        let report = extract::inspect_html(&html).wrap_err("Failed to inspect page")?;
        let extraction = extract::extract_html(&html).wrap_err("Failed to extract conversation")?;

        println!("== {}", name);
        for row in report {
            println!("  {:<13} {:<32} {}", row.group, row.selector, row.count);
        }
        println!(
            "  strategy: {}, messages: {}, skipped: {}",
            extraction.strategy.unwrap_or("none"),
            extraction.entries.len(),
            extraction.skipped
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve format and labels (CLI > Config > Default)
    let format = cli.format.or(file_cfg.format).unwrap_or_default();
    let defaults = RoleLabels::default();
    let labels = RoleLabels {
        user: cli
            .user_label
            .or(file_cfg.user_label)
            .unwrap_or(defaults.user),
        assistant: cli
            .assistant_label
            .or(file_cfg.assistant_label)
            .unwrap_or(defaults.assistant),
    };

    if cli.inspect {
        return print_inspection(&cli.inputs);
    }
    if cli.inputs.is_empty() || cli.stdout {
        return print_transcripts(&cli.inputs, format, &labels);
    }

    // 3. Resolve target_dir (CLI > Config > Default)
    let target_dir = cli
        .out
        .or(file_cfg.target_dir)
        .unwrap_or_else(|| PathBuf::from("gemini-chat-export"));

    // 4. Build the Export Config
    let config = ExportConfig {
        target_dir,
        inputs: cli.inputs,
        format,
        labels,
        force: cli.force,
        quiet: cli.quiet,
    };

    // 5. Run the Business Logic
    #[cfg(feature = "sequential")]
    return sequential::execute(config);

    #[cfg(not(feature = "sequential"))]
    parallel::execute(config)
}
