//! CrypTool CLI - Command line interface for text and file encryption.
//!
//! This tool collects the method, key strength, key and IV, runs the job on
//! a background worker, renders progress, and stops the job on Ctrl-C.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use cryptool_app::{JobEvent, JobHandle, JobInput, JobOutput, JobReport, JobRequest, Mode};
use cryptool_common::{Error, KeyStrength, ProgressEvent};
use cryptool_crypto::{Engine, EngineConfig};

#[derive(Parser)]
#[command(name = "cryptool")]
#[command(about = "CrypTool - Encrypt and decrypt text and files")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file with engine settings, e.g. {"chunk_size": 65536}.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by both subcommands.
#[derive(Args)]
struct CipherArgs {
    /// Method: "encrypt", "decrypt", or "auto".
    #[arg(short, long, default_value = "encrypt")]
    method: Mode,

    /// Key strength in bits: 64, 128, 192, or 256.
    #[arg(short, long, default_value = "128")]
    bits: KeyStrength,

    /// Key. Prompted for when omitted.
    #[arg(short, long)]
    key: Option<String>,

    /// Initialization vector. Derived from the key when omitted.
    #[arg(long)]
    iv: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt or decrypt text. Ciphertext is Base64.
    Text {
        #[command(flatten)]
        cipher: CipherArgs,

        /// Text to process. Read from stdin when omitted.
        text: Option<String>,
    },

    /// Encrypt or decrypt a file.
    File {
        #[command(flatten)]
        cipher: CipherArgs,

        /// Source file.
        #[arg(short, long)]
        source: PathBuf,

        /// Destination file.
        #[arg(short, long)]
        dest: PathBuf,

        /// Overwrite the destination if it exists.
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let engine = load_engine(cli.config.as_deref())?;

    match cli.command {
        Commands::Text { cipher, text } => cmd_text(engine, cipher, text).await,
        Commands::File {
            cipher,
            source,
            dest,
            force,
        } => cmd_file(engine, cipher, source, dest, force).await,
    }
}

/// Build the engine from defaults or a JSON config file.
fn load_engine(path: Option<&Path>) -> Result<Engine> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str::<EngineConfig>(&content)
                .map_err(|e| Error::Serialization(e.to_string()))
                .context("Invalid config file")?
        }
        None => EngineConfig::default(),
    };
    Engine::new(config).context("Invalid engine configuration")
}

/// Prompt for the key securely unless it was given on the command line.
fn resolve_key(key: Option<String>) -> Result<Zeroizing<String>> {
    match key {
        Some(key) => Ok(Zeroizing::new(key)),
        None => {
            let key = rpassword::prompt_password("Enter key: ").context("Failed to read key")?;
            Ok(Zeroizing::new(key))
        }
    }
}

/// Encrypt or decrypt text.
async fn cmd_text(engine: Engine, cipher: CipherArgs, text: Option<String>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read text from stdin")?;
            buf
        }
    };

    let request = JobRequest {
        mode: cipher.method,
        strength: cipher.bits,
        passphrase: resolve_key(cipher.key)?,
        iv: cipher.iv,
        input: JobInput::Text(text),
    };

    let handle = cryptool_app::spawn(request, engine).context("Cannot start")?;
    let report = drive(handle, false).await?;

    if let JobOutput::Text(output) = report.output {
        info!("Text {}ed", report.direction);
        println!("{}", output);
    }

    Ok(())
}

/// Encrypt or decrypt a file.
async fn cmd_file(
    engine: Engine,
    cipher: CipherArgs,
    source: PathBuf,
    dest: PathBuf,
    force: bool,
) -> Result<()> {
    info!("Processing {} -> {}", source.display(), dest.display());

    let request = JobRequest {
        mode: cipher.method,
        strength: cipher.bits,
        passphrase: resolve_key(cipher.key)?,
        iv: cipher.iv,
        input: JobInput::File {
            source,
            destination: dest.clone(),
            overwrite: force,
        },
    };

    let handle = cryptool_app::spawn(request, engine).context("Cannot start")?;
    let report = drive(handle, true).await?;

    if let JobOutput::File { bytes_written } = report.output {
        println!(
            "Finished: {}ed {} ({} bytes)",
            report.direction,
            dest.display(),
            bytes_written
        );
    }

    Ok(())
}

/// Pump job events to the terminal until the job ends, cancelling on Ctrl-C.
async fn drive(mut handle: JobHandle, show_progress: bool) -> Result<JobReport> {
    let token = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        match event {
            JobEvent::Started { direction } => {
                info!("Attempting to {}", direction);
            }
            JobEvent::Progress(progress) if show_progress => render_progress(&progress),
            JobEvent::Progress(_) => {}
        }
    }
    if show_progress {
        eprintln!();
    }

    match handle.wait().await {
        Ok(report) => Ok(report),
        Err(Error::Cancelled) => anyhow::bail!("Stopped."),
        Err(Error::CiphertextInvalid) => {
            anyhow::bail!("Input is not valid ciphertext for this key and strength")
        }
        Err(e) => Err(e).context("Operation failed"),
    }
}

fn render_progress(progress: &ProgressEvent) {
    let mut stderr = std::io::stderr();
    let _ = match progress.fraction() {
        Some(fraction) => write!(
            stderr,
            "\r  {:>5.1}%  {} / {} bytes",
            fraction * 100.0,
            progress.bytes_processed,
            progress.total_bytes.unwrap_or_default()
        ),
        None => write!(stderr, "\r  {} bytes", progress.bytes_processed),
    };
    let _ = stderr.flush();
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
    fn test_parse_file_command() {
        let cli = Cli::try_parse_from([
            "cryptool", "file", "-m", "auto", "-b", "256", "-k", "secret", "-s", "in.bin", "-d",
            "out.bin", "--force",
        ])
        .unwrap();
        match cli.command {
            Commands::File {
                cipher,
                source,
                dest,
                force,
            } => {
                assert_eq!(cipher.method, Mode::Auto);
                assert_eq!(cipher.bits, KeyStrength::Bits256);
                assert_eq!(cipher.key.as_deref(), Some("secret"));
                assert_eq!(source, PathBuf::from("in.bin"));
                assert_eq!(dest, PathBuf::from("out.bin"));
                assert!(force);
            }
            _ => panic!("expected file command"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_strength() {
        assert!(Cli::try_parse_from(["cryptool", "text", "-b", "100", "hello"]).is_err());
    }

    #[test]
    fn test_load_engine_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"chunk_size": 4096}"#).unwrap();
        let engine = load_engine(Some(&path)).unwrap();
        assert_eq!(engine.config().chunk_size, 4096);

        std::fs::write(&path, r#"{"chunk_size": 0}"#).unwrap();
        assert!(load_engine(Some(&path)).is_err());

        assert_eq!(
            load_engine(None).unwrap().config(),
            &EngineConfig::default()
        );
    }
}
