//! receiptscan CLI
//!
//! Command-line client for the receipt scanner service: check health,
//! list models, and extract structured data from a receipt image.
//!
//! Copyright (c) 2025 Michael A Wright

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nbuilt: ",
    env!("BUILT_TIME_UTC"),
    "\nhost: ",
    env!("BUILT_HOST"),
    "\ncommit: ",
    env!("BUILT_GIT_COMMIT_HASH"),
);

#[derive(Parser)]
#[command(name = "receiptscan")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Extract structured data from receipt images via the receiptscan service", long_about = None)]
struct Cli {
    /// Base URL of the receiptscan server
    #[arg(short, long, env = "RECEIPTSCAN_URL", default_value = "http://localhost:8000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the service is up and whether the model is loaded
    Health,

    /// Show the configured model and suggestions
    Models,

    /// Extract receipt data from an image file or URL
    Extract {
        /// Local image file (png, jpg, jpeg, webp)
        #[arg(short, long, conflicts_with = "url", required_unless_present = "url")]
        image: Option<PathBuf>,

        /// Image URL for the server to download
        #[arg(short, long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!(
        version = built_info::PKG_VERSION,
        rustc = built_info::RUSTC_VERSION,
        profile = built_info::PROFILE,
        "receiptscan client"
    );
    let client = reqwest::Client::new();
    let base = cli.server.trim_end_matches('/');

    let request = match &cli.command {
        Commands::Health => client.get(format!("{base}/health")),
        Commands::Models => client.get(format!("{base}/models")),
        Commands::Extract { image: Some(path), .. } => {
            let form = upload_form(path).await?;
            client.post(format!("{base}/extract")).multipart(form)
        }
        Commands::Extract { url: Some(url), .. } => client
            .post(format!("{base}/extract"))
            .json(&json!({ "image_url": url })),
        Commands::Extract { .. } => anyhow::bail!("either --image or --url is required"),
    };

    tracing::debug!(server = base, "Sending request");
    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to reach receiptscan server at {base}"))?;
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .context("Server returned a non-JSON response")?;

    println!("{}", serde_json::to_string_pretty(&body)?);

    if !status.is_success() {
        anyhow::bail!("Request failed with status {}", status);
    }
    Ok(())
}

/// Multipart form with the file under the `image` field
async fn upload_form(path: &Path) -> Result<reqwest::multipart::Form> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Image file not found: {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "receipt.png".to_string());

    tracing::info!(file = %filename, size = bytes.len(), "Uploading image");
    let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
    Ok(reqwest::multipart::Form::new().part("image", part))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_extract_requires_a_source() {
        assert!(Cli::try_parse_from(["receiptscan", "extract"]).is_err());
        assert!(Cli::try_parse_from([
            "receiptscan",
            "extract",
            "--image",
            "a.png",
            "--url",
            "http://example.com/a.png"
        ])
        .is_err());
    }

    #[test]
    fn test_extract_with_image() {
        let cli = Cli::try_parse_from([
            "receiptscan",
            "--server",
            "http://10.0.0.2:8000",
            "extract",
            "--image",
            "receipt.jpg",
        ])
        .unwrap();

        assert_eq!(cli.server, "http://10.0.0.2:8000");
        match cli.command {
            Commands::Extract { image, url } => {
                assert_eq!(image, Some(PathBuf::from("receipt.jpg")));
                assert!(url.is_none());
            }
            _ => panic!("expected extract"),
        }
    }

    #[tokio::test]
    async fn test_upload_form_missing_file() {
        let err = upload_form(Path::new("/nonexistent/receipt.png"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Image file not found"));
    }
}
