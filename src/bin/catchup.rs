use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use catchup_card::{CardService, RenderBridge, SeriesStore, ServiceConfig, StaticStore};

#[derive(Parser, Debug)]
#[command(name = "catchup", version, about = "Convergence share-card renderer")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP card service.
    Serve(ServeArgs),
    /// Render one card to a file.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Service configuration JSON. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address.
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Comparison query string, e.g. `c=IND&t=USA&h=40`.
    #[arg(long, default_value = "")]
    query: String,

    /// Output path.
    #[arg(long)]
    out: PathBuf,

    /// Series table JSON (overrides `data_path` from the config).
    #[arg(long)]
    data: Option<PathBuf>,

    /// Service configuration JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the SVG instead of rasterizing it.
    #[arg(long, default_value_t = false)]
    svg: bool,

    /// Skip system fonts (faster start, text may not render).
    #[arg(long, default_value_t = false)]
    no_system_fonts: bool,
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Serve(args) => cmd_serve(args),
        Command::Render(args) => cmd_render(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ServiceConfig> {
    match path {
        Some(p) => ServiceConfig::from_path(p).with_context(|| format!("load '{}'", p.display())),
        None => Ok(ServiceConfig::default()),
    }
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    let rt = tokio::runtime::Runtime::new().context("start tokio runtime")?;
    rt.block_on(catchup_card::service::serve(config))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if args.no_system_fonts {
        config.fonts.load_system_fonts = false;
    }
    let data_path = args.data.or(config.data_path.clone());
    let store: Arc<dyn SeriesStore> = match &data_path {
        Some(path) => Arc::new(StaticStore::from_path(path)?),
        None => Arc::new(StaticStore::empty()),
    };

    let bridge = RenderBridge::global();
    let service = CardService::new(&config, store, bridge)?;
    let prepared = service.prepare(&args.query);
    if prepared.document.is_degraded() {
        tracing::warn!(query = %args.query, "no data for this comparison; card is degraded");
    }

    let body = if args.svg {
        prepared.document.svg.into_bytes()
    } else {
        bridge.init(&config.module_source())?;
        service.render(&prepared)?.data
    };

    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(&args.out, &body)
        .with_context(|| format!("write '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
