use std::{net::SocketAddr, path::PathBuf};

use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use spotstats::{cli, config, error, report::ExportFormat, types::EntityKind};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    #[clap(about = "Run the HTTP server (login, sync, reports)")]
    Serve(ServeOptions),

    #[clap(about = "Show the most frequent tracks, albums or artists of a synced user")]
    Top(TopOptions),

    #[clap(about = "Export the synced playlist data of a user")]
    Export(ExportOptions),

    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct ServeOptions {
    /// Overrides SERVER_ADDRESS.
    #[clap(long)]
    address: Option<SocketAddr>,
}

#[derive(Parser, Debug, Clone)]
pub struct TopOptions {
    #[clap(long)]
    user: String,

    #[clap(long, value_enum, default_value = "track")]
    kind: EntityKind,

    #[clap(short, long, default_value_t = 10)]
    n: usize,

    /// Also write a PNG bar chart to this path.
    #[clap(long)]
    chart: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ExportOptions {
    #[clap(long)]
    user: String,

    #[clap(long, value_enum, default_value = "csv")]
    format: ExportFormat,

    /// Write to a file instead of stdout.
    #[clap(short, long)]
    output: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init();
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(opt) => cli::serve(opt.address).await,
        Command::Top(opt) => cli::top(opt.user, opt.kind, opt.n, opt.chart).await,
        Command::Export(opt) => cli::export(opt.user, opt.format, opt.output).await,
        Command::Completions(opt) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
    }
}
