//! s3-url-handler - Resolver-style access to artifacts stored in S3
//!
//! Exposes the handler operations on the command line.

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use s3_url_handler::config::{Config, ConfigLoader};
use s3_url_handler::handler::{LoggingListener, S3UrlHandler};
use s3_url_handler::metrics;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// s3-url-handler - Fetch and publish resolver artifacts in S3
#[derive(Parser, Debug)]
#[command(name = "s3-url-handler")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Process property, repeatable (e.g. -D https.proxyHost=proxy.local)
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_property)]
    properties: Vec<(String, String)>,

    /// Print Prometheus metrics to stderr before exiting
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether an object exists, its size and last-modified time
    Stat {
        url: String,
        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Write an object to stdout
    Cat { url: String },
    /// List the children of a prefix
    Ls { url: String },
    /// Download an object to a file
    Fetch { url: String, destination: PathBuf },
    /// Upload a file to an object
    Put { source: PathBuf, url: String },
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => ConfigLoader::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let config = config.with_properties(args.properties.iter().cloned());
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;
    info!("Starting s3-url-handler v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let handler = S3UrlHandler::from_config(&config);

    let result = run(&handler, args.command).await;

    if args.print_metrics {
        eprint!("{}", metrics::gather_text());
    }

    result
}

async fn run(handler: &S3UrlHandler, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Stat { url, timeout_ms } => {
            let info = match timeout_ms {
                Some(ms) => handler.stat_within(&url, Duration::from_millis(ms)).await?,
                None => handler.stat(&url).await?,
            };
            println!("available: {}", info.available);
            println!("content_length: {}", info.content_length);
            println!("last_modified: {}", info.last_modified_millis());
            if let Some(modified) = info.last_modified {
                let utc: DateTime<Utc> = modified.into();
                println!("last_modified_utc: {}", utc.to_rfc3339());
            }
        }
        Command::Cat { url } => {
            let mut reader = handler.open(&url).await?;
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut reader, &mut stdout).await?;
            stdout.flush().await?;
        }
        Command::Ls { url } => {
            for child in handler.list(&url).await? {
                println!("{}", child);
            }
        }
        Command::Fetch { url, destination } => {
            let bytes = handler
                .fetch(&url, &destination, Some(&LoggingListener))
                .await?;
            println!("{} bytes -> {}", bytes, destination.display());
        }
        Command::Put { source, url } => {
            let outcome = handler.put(&source, &url, Some(&LoggingListener)).await?;
            println!(
                "{} bytes -> {} (etag {})",
                outcome.bytes,
                url,
                outcome.etag.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property() {
        assert_eq!(
            parse_property("https.proxyPort=3128"),
            Ok(("https.proxyPort".to_string(), "3128".to_string()))
        );
        assert_eq!(
            parse_property("aws.secretKey=a=b"),
            Ok(("aws.secretKey".to_string(), "a=b".to_string()))
        );
        assert!(parse_property("novalue").is_err());
        assert!(parse_property("=value").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "s3-url-handler",
            "-D",
            "https.proxyHost=proxy.local",
            "-D",
            "https.proxyPort=3128",
            "ls",
            "s3://releases/libs/",
        ])
        .unwrap();
        assert_eq!(args.properties.len(), 2);
        assert!(matches!(args.command, Command::Ls { ref url } if url == "s3://releases/libs/"));
    }
}
