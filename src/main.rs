//! CLI entry point for `mailnorm`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailnorm::config::{Config, ExtractionConfig, FallbackPolicy};
use mailnorm::export::attachment::export_attachments;
use mailnorm::model::message::RawMessage;
use mailnorm::model::normalized::Normalized;
use mailnorm::normalize::Normalizer;
use mailnorm::parser::attachment::extract_with_policy;
use mailnorm::parser::header::decode_encoded_words;

/// Normalize inbound email into clean text and recovered attachments.
#[derive(Parser)]
#[command(name = "mailnorm", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize message files (.eml raw bytes or .json producer values)
    Normalize {
        #[arg(required = true, value_name = "FILES")]
        paths: Vec<PathBuf>,
        /// Print the normalized messages as JSON
        #[arg(long)]
        json: bool,
        /// Attach the original message as .eml when nothing can be extracted
        #[arg(long)]
        eml_fallback: bool,
    },
    /// Extract the attachments of a message into a directory
    Attachments {
        path: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Attach the original message as .eml when nothing can be extracted
        #[arg(long)]
        eml_fallback: bool,
    },
    /// Decode an RFC 2047 header value
    DecodeHeader { value: String },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = mailnorm::config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Normalize {
            paths,
            json,
            eml_fallback,
        } => cmd_normalize(&paths, json, extraction_config(&config, eml_fallback)),
        Commands::Attachments {
            path,
            output,
            eml_fallback,
        } => cmd_attachments(&path, &output, &extraction_config(&config, eml_fallback)),
        Commands::DecodeHeader { value } => {
            println!("{}", decode_encoded_words(&value));
            Ok(())
        }
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

fn extraction_config(config: &Config, eml_fallback: bool) -> ExtractionConfig {
    let mut extraction = config.extraction.clone();
    if eml_fallback {
        extraction.fallback_policy = FallbackPolicy::EmlDump;
    }
    extraction
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = mailnorm::config::log_file_path(config);
    let log_dir = mailnorm::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_name = log_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "mailnorm.log".into());
        let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailnorm", &mut std::io::stdout());
    Ok(())
}

/// Normalize each file and print a summary (or JSON).
fn cmd_normalize(paths: &[PathBuf], json: bool, config: ExtractionConfig) -> anyhow::Result<()> {
    let normalizer = Normalizer::new(config);

    let pb = if paths.len() > 1 && !json {
        let pb = ProgressBar::new(paths.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} Normalizing [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .expect("valid template")
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let start = Instant::now();
    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        let msg = RawMessage::from_path(path)
            .with_context(|| format!("reading {}", path.display()))?;
        results.push((path, normalizer.normalize(&msg)));
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if json {
        let values: Vec<&Normalized> = results.iter().map(|(_, n)| n).collect();
        let out = if values.len() == 1 {
            serde_json::to_string_pretty(values[0])?
        } else {
            serde_json::to_string_pretty(&values)?
        };
        println!("{out}");
        return Ok(());
    }

    for (path, normalized) in &results {
        print_summary(path, normalized);
    }
    let degraded = results.iter().filter(|(_, n)| n.is_degraded()).count();
    println!(
        "{} message(s) in {:.2?}, {} degraded",
        results.len(),
        start.elapsed(),
        degraded
    );
    Ok(())
}

fn print_summary(path: &Path, n: &Normalized) {
    use humansize::{format_size, BINARY};

    println!("━━━ {} ━━━", path.display());
    println!("  From:        {}", n.from);
    println!("  To:          {}", n.to);
    if !n.cc.is_empty() {
        println!("  Cc:          {}", n.cc);
    }
    println!("  Subject:     {}", n.subject);
    println!("  Date:        {}", n.date);
    println!("  Message-ID:  {}", n.message_id);
    for att in &n.attachments {
        println!(
            "  Attachment:  {} ({}, {})",
            att.filename,
            att.content_type,
            format_size(att.size(), BINARY)
        );
    }
    for notice in &n.notices {
        println!("  Notice:      {notice}");
    }
    println!();
    println!("{}", n.body);
    println!();
}

/// Extract the attachments of one message into `output`.
fn cmd_attachments(path: &Path, output: &Path, config: &ExtractionConfig) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let msg = RawMessage::from_path(path).with_context(|| format!("reading {}", path.display()))?;
    let extraction = extract_with_policy(&msg, config);

    if extraction.attachments.is_empty() {
        println!("No attachments found in {}", path.display());
        return Ok(());
    }

    let written = export_attachments(&extraction.attachments, output)?;
    for dest in &written {
        let size = std::fs::metadata(dest).map(|m| m.len()).unwrap_or(0);
        println!("  {} ({})", dest.display(), format_size(size, BINARY));
    }
    if let Some(notice) = &extraction.notice {
        eprintln!("{notice}");
    }
    println!(
        "Extracted {} attachment(s) to {} (source: {:?})",
        written.len(),
        output.display(),
        extraction.source
    );
    Ok(())
}
