//! wcocr - recognize text in one image with the WeChat OCR engine

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wcocr_bridge::config::{self, AppConfig};
use wcocr_bridge::{NativeEngine, OcrBridge, OcrResult};

/// Recognize text in an image through wcocr.dll
#[derive(Parser, Debug)]
#[command(name = "wcocr")]
#[command(about = "Run WeChat OCR on one image and print the JSON result")]
struct Args {
    /// Full path of the image to recognize
    image: String,

    /// Configuration file (defaults to the per-user config.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to wcocr.dll
    #[arg(long)]
    module: Option<PathBuf>,

    /// Path to WeChatOCR.exe
    #[arg(long)]
    ocr_exe: Option<PathBuf>,

    /// WeChat installation directory
    #[arg(long)]
    wechat_dir: Option<PathBuf>,

    /// Give up after this many milliseconds without a result
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print only the raw JSON payload
    #[arg(long)]
    raw: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = resolve_config(&args)?;
    config.engine.validate()?;

    let engine = NativeEngine::open(
        config.engine.module_path.clone(),
        &config.engine.ocr_exe,
        &config.engine.wechat_dir,
    );
    let bridge = OcrBridge::with_options(engine, config.bridge.to_options());

    info!("Recognizing {}", args.image);
    let output = bridge
        .recognize(&args.image)
        .with_context(|| format!("OCR failed for {}", args.image))?;

    println!("{}", output.raw);
    if !args.raw {
        if let Some(result) = &output.result {
            print_summary(result);
        }
    }

    Ok(())
}

/// Config file values with command-line overrides applied
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = config::load_or_default(args.config.as_deref())?;

    if let Some(module) = &args.module {
        config.engine.module_path = module.clone();
    }
    if let Some(ocr_exe) = &args.ocr_exe {
        config.engine.ocr_exe = ocr_exe.clone();
    }
    if let Some(wechat_dir) = &args.wechat_dir {
        config.engine.wechat_dir = wechat_dir.clone();
    }
    if args.timeout_ms.is_some() {
        config.bridge.timeout_ms = args.timeout_ms;
    }

    Ok(config)
}

fn print_summary(result: &OcrResult) {
    match result.error_message() {
        None => {
            println!("Recognized {} text regions:", result.ocr_response.len());
            for (i, item) in result.ocr_response.iter().enumerate() {
                println!("{}: {} (confidence: {:.2}%)", i + 1, item.text, item.rate * 100.0);
            }
        }
        Some(message) => println!("OCR failed, {}", message),
    }
}
