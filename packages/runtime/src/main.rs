use std::path::PathBuf;

use clap::Parser;
use nux_host::{HeadlessBackend, ScriptedInput, Session};
use nux_runtime::{Result, RunSummary, Runtime, RuntimeConfig, WasmGuest};
use tracing_subscriber::EnvFilter;

/// nux - run a guest module on the nux host
#[derive(Parser, Debug)]
#[command(name = "nux")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Guest module (.wasm or .wat)
    module: PathBuf,

    /// Cart blob exposed to the guest as a virtual file
    #[arg(long)]
    cart: Option<PathBuf>,

    /// Virtual file name for the cart (overrides the config)
    #[arg(long)]
    name: Option<String>,

    /// JSON runtime configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run this many frames headless instead of in real time
    #[arg(long)]
    frames: Option<u64>,

    /// JSON input script, one snapshot per frame
    #[arg(long)]
    input: Option<PathBuf>,

    /// Log filter, e.g. "info" or "nux_host=debug,guest=trace"
    #[arg(long)]
    log: Option<String>,
}

fn init_tracing(filter: Option<&str>) {
    let filter = filter
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(args: Args) -> Result<RunSummary> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(name) = args.name {
        config.host.cart_name = name;
    }

    let mut session = Session::new(config.host.clone(), Box::new(HeadlessBackend::new()));
    if let Some(path) = &args.cart {
        session = session.with_cart(std::fs::read(path)?);
    }
    if let Some(path) = &args.input {
        let script = ScriptedInput::from_json(&std::fs::read_to_string(path)?)?;
        session = session.with_input(Box::new(script));
    }

    let guest = WasmGuest::from_file(&args.module, session, &config)?;
    let mut runtime = Runtime::new(config, guest);

    match args.frames {
        Some(frames) => runtime.run_frames(frames),
        None => tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(runtime.run_realtime()),
    }
}

fn main() {
    let args = Args::parse();
    init_tracing(args.log.as_deref());

    match run(args) {
        Ok(summary) => {
            tracing::info!(frames = summary.frames, "done");
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
