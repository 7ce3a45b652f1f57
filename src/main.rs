use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::redirect::Policy;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use feedsync::config::Config;
use feedsync::content::{
    ContentExtractor, DisabledTagger, EntityTagger, HttpEntityTagger, PageExtractor, ReaderClient,
};
use feedsync::feed::HttpFeedSource;
use feedsync::handler::{handle, InvocationRequest, Services};
use feedsync::notify::{Notifier, SmtpNotifier};
use feedsync::snapshot::FsBlobStore;
use feedsync::storage::{Database, StoreError};

#[derive(Parser, Debug)]
#[command(
    name = "feedsync",
    about = "Ingest syndication feeds and publish per-category JSON snapshots"
)]
struct Args {
    /// Path to a TOML config file (environment variables override it)
    #[arg(long, value_name = "FILE", default_value = "feedsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one feed into the record store
    Feed {
        #[arg(long)]
        url: String,
        #[arg(long)]
        category: String,
        /// Guid already held for this feed (repeatable)
        #[arg(long = "guid", value_name = "GUID")]
        guids: Vec<String>,
    },
    /// Rebuild the "all" snapshot if the bucket changed in the last minute
    All,
    /// Rebuild one category's snapshot
    Snapshot { category: String },
    /// Read a JSON invocation request from stdin
    Invoke,
}

impl Command {
    async fn into_request(self) -> Result<InvocationRequest> {
        Ok(match self {
            Command::Feed {
                url,
                category,
                guids,
            } => InvocationRequest::Feed {
                url,
                category,
                known_guids: guids,
            },
            Command::All => InvocationRequest::All,
            Command::Snapshot { category } => InvocationRequest::Snapshot { category },
            Command::Invoke => {
                let mut input = String::new();
                tokio::io::stdin()
                    .read_to_string(&mut input)
                    .await
                    .context("Failed to read request from stdin")?;
                serde_json::from_str(&input).context("Invalid invocation request")?
            }
        })
    }
}

/// Follows at most 3 redirects and stops on loops.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }
        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }
        tracing::debug!(to = %url, hop = attempt.previous().len() + 1, "Following redirect");
        attempt.follow()
    })
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    let mut config = Config::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.apply_env().context("Invalid environment override")?;
    config.validate()?;
    tracing::debug!(config = ?config, "Effective configuration");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    let request = args.command.into_request().await?;

    let db = match Database::open(&config.database_path).await {
        Ok(db) => db,
        Err(StoreError::Locked) => {
            anyhow::bail!(
                "Record store {} is locked by another process, try again later",
                config.database_path
            );
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open record store: {}", e)),
    };
    let blobs = FsBlobStore::open(&config.snapshot_dir)
        .await
        .with_context(|| format!("Failed to open snapshot dir {}", config.snapshot_dir.display()))?;

    let http_client = reqwest::Client::builder()
        .redirect(create_redirect_policy())
        .pool_max_idle_per_host(4)
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let feeds = HttpFeedSource::new(http_client.clone());

    let page_extractor;
    let reader_client;
    let extractor: &dyn ContentExtractor = match &config.reader_base_url {
        Some(base_url) => {
            reader_client = ReaderClient::new(
                base_url,
                config.reader_api_key.clone().map(SecretString::from),
            )
            .context("Failed to configure reader service")?;
            &reader_client
        }
        None => {
            page_extractor = PageExtractor::new(http_client.clone());
            &page_extractor
        }
    };

    let http_tagger;
    let tagger: &dyn EntityTagger = match &config.tagger_url {
        Some(url) => {
            http_tagger = HttpEntityTagger::new(http_client.clone(), url);
            &http_tagger
        }
        None => &DisabledTagger,
    };

    let smtp;
    let notifier: Option<&dyn Notifier> = match (
        config.send_emails,
        config.smtp_host.as_deref(),
        config.from_email.as_deref(),
    ) {
        (true, Some(host), Some(from)) => {
            smtp = SmtpNotifier::new(
                host,
                config.smtp_username.as_deref(),
                config.smtp_password.clone().map(SecretString::from),
                from,
            )
            .context("Failed to configure mail relay")?;
            Some(&smtp)
        }
        _ => None,
    };

    let services = Services {
        feeds: &feeds,
        extractor,
        tagger,
        store: &db,
        blobs: &blobs,
        notifier,
    };

    let outcome = match handle(request, &services, &config).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "Invocation failed");
            return Err(e.into());
        }
    };

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}
