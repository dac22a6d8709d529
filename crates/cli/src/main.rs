//! Command-line client for chanstore.

use anyhow::{Context, Result};
use bytes::Bytes;
use chanstore_channel::{ChannelId, Credentials, TransferClient, UploadReceipt};
use chanstore_core::config::AppConfig;
use chanstore_core::{ContentHash, expected_chunk_count};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chanstore")]
#[command(about = "Store files as chunks in a messaging channel")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(long, global = true, env = "CHANSTORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ChannelArgs {
    /// Bot token used to open the channel
    #[arg(long, env = "CHANSTORE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Channel holding the chunks
    #[arg(long, env = "CHANSTORE_CHANNEL")]
    channel: Option<String>,
}

impl ChannelArgs {
    fn resolve(&self) -> Result<(Credentials, ChannelId)> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .context("no token given; pass --token or set CHANSTORE_TOKEN")?;
        let channel = self
            .channel
            .as_deref()
            .filter(|c| !c.is_empty())
            .context("no channel given; pass --channel or set CHANSTORE_CHANNEL")?;
        Ok((Credentials::new(token), ChannelId::new(channel)))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and print its content hash
    Put {
        /// File to upload
        file: PathBuf,
        #[command(flatten)]
        channel: ChannelArgs,
    },
    /// Retrieve a file by content hash
    Get {
        /// Content hash (64 hex characters)
        hash: String,
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Expected size in bytes; enables the size check and stops the scan early
        #[arg(long)]
        size: Option<u64>,
        #[command(flatten)]
        channel: ChannelArgs,
    },
    /// Print the content hash of a local file
    Hash {
        /// File to hash
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `get` can stream file bytes to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let Cli { config, command } = Cli::parse();

    match command {
        Commands::Put { file, channel } => {
            let config = load_config(config.as_deref())?;
            let client = build_client(&config)?;
            let (credentials, channel_id) = channel.resolve()?;
            let receipt = put_file(&client, &credentials, &channel_id, &file).await?;
            println!("Uploaded {}", file.display());
            println!("  Hash:   {}", receipt.hash);
            println!("  Size:   {} bytes", receipt.bytes_sent);
            println!("  Chunks: {}", receipt.chunks_sent);
            Ok(())
        }
        Commands::Get {
            hash,
            output,
            size,
            channel,
        } => {
            let config = load_config(config.as_deref())?;
            let client = build_client(&config)?;
            let (credentials, channel_id) = channel.resolve()?;
            let data = get_file(&client, &credentials, &channel_id, &hash, size).await?;
            match output {
                Some(path) => {
                    write_output(&path, &data).await?;
                    eprintln!("Wrote {} bytes to {}", data.len(), path.display());
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    stdout.write_all(&data).await?;
                    stdout.flush().await?;
                }
            }
            Ok(())
        }
        Commands::Hash { file } => {
            let config = load_config(config.as_deref())?;
            let (hash, size) = hash_file(&file).await?;
            println!("{}  {}", hash, file.display());
            tracing::info!(
                size,
                chunks = expected_chunk_count(size, config.transfer.chunk_size),
                "hashed file"
            );
            Ok(())
        }
    }
}

/// Load configuration from an optional file and `CHANSTORE_` environment variables.
fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::new();

    if let Some(path) = path {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CHANSTORE_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_client(config: &AppConfig) -> Result<TransferClient> {
    let backend = chanstore_channel::from_config(&config.backend)
        .context("failed to initialize messaging backend")?;
    Ok(TransferClient::new(backend, config.transfer.clone()))
}

async fn put_file(
    client: &TransferClient,
    credentials: &Credentials,
    channel_id: &ChannelId,
    path: &Path,
) -> Result<UploadReceipt> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let receipt = client
        .upload(credentials, channel_id, &Bytes::from(data))
        .await
        .with_context(|| format!("failed to upload {}", path.display()))?;
    Ok(receipt)
}

async fn get_file(
    client: &TransferClient,
    credentials: &Credentials,
    channel_id: &ChannelId,
    hash: &str,
    size: Option<u64>,
) -> Result<Bytes> {
    let hash = ContentHash::from_hex(hash).context("invalid content hash")?;
    let data = client
        .retrieve(credentials, channel_id, &hash, size)
        .await
        .with_context(|| format!("failed to retrieve {hash}"))?;
    Ok(data)
}

/// Hash a file without holding it in memory.
async fn hash_file(path: &Path) -> Result<(ContentHash, u64)> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = ContentHash::hasher();
    let mut buf = vec![0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = file
            .read(&mut buf)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hasher.finalize(), size))
}

async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("failed to write {}", path.display()))
}
