use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lan_share::discovery::{self, select_session, Selection};
use lan_share::{
    Config, CursorSelection, FileEditor, FsDocumentStore, HostAddrs, HostEndpoint, HostSession,
    PeerSession, SessionSettings,
};

#[derive(Parser)]
#[command(name = "lan-share")]
#[command(about = "Share live documents and cursors with a host on your local network", version)]
struct Cli {
    /// TOML config file (defaults, then this file, then LAN_SHARE_* env)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the well-known port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Also write daily-rolling logs into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host a session and collect peers' documents
    Host(HostArgs),

    /// List sessions advertised on the local network
    Discover {
        /// Quiet period that ends discovery, in milliseconds
        #[arg(long)]
        silence_ms: Option<u64>,

        /// Print candidates as JSON
        #[arg(long)]
        json: bool,
    },

    /// Join a session and publish a file as your active document
    Join(JoinArgs),
}

#[derive(Args)]
struct HostArgs {
    /// Session name (letters, digits, `-`, `_`)
    #[arg(short, long)]
    session: String,

    /// Interface address, `a.b.c.d/prefix` or bare with --netmask
    #[arg(short, long)]
    address: String,

    #[arg(long)]
    netmask: Option<String>,

    /// Require peers to send this password
    #[arg(long)]
    password: Option<String>,

    /// Directory received documents are written under
    #[arg(long)]
    root: Option<PathBuf>,
}

#[derive(Args)]
struct JoinArgs {
    /// File to publish
    file: PathBuf,

    /// Pick the discovered session with this name
    #[arg(short, long)]
    session: String,

    /// Skip discovery and post to this host
    #[arg(long)]
    host: Option<String>,

    /// Identify yourself to the host (defaults to the OS user)
    #[arg(short, long)]
    username: Option<String>,

    /// Post to `/<session>/<file>` without a peer segment
    #[arg(long, conflicts_with = "username")]
    anonymous: bool,

    #[arg(long)]
    password: Option<String>,

    /// Selection to report, `line:char-line:char`
    #[arg(long, default_value = "0:0-0:0")]
    selection: String,

    /// Publish cadence in milliseconds (100..=500)
    #[arg(long)]
    interval_ms: Option<u64>,
}

fn init_logging(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lan_share=info"));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lan-share.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            None
        }
    }
}

fn parse_selection(text: &str) -> Result<CursorSelection> {
    let parse_pos = |pos: &str| -> Result<(u32, u32)> {
        let (line, ch) = pos
            .split_once(':')
            .ok_or_else(|| anyhow!("expected line:char, got `{pos}`"))?;
        Ok((line.trim().parse()?, ch.trim().parse()?))
    };
    let (start, end) = text
        .split_once('-')
        .ok_or_else(|| anyhow!("expected line:char-line:char, got `{text}`"))?;
    let (start_line, start_char) = parse_pos(start)?;
    let (end_line, end_char) = parse_pos(end)?;
    Ok(CursorSelection::new(start_line, start_char, end_line, end_char))
}

async fn run_host(config: Config, args: HostArgs) -> Result<()> {
    let endpoint = HostEndpoint::parse(&args.address, args.netmask.as_deref())?;
    let mut settings = SessionSettings::new(args.session);
    settings.password = args.password;

    let root = args.root.unwrap_or_else(|| config.session_root.clone());
    let store = Arc::new(FsDocumentStore::new(&root));
    let addrs = HostAddrs::from_endpoint(&endpoint, config.port);

    let session = HostSession::start(&config, settings, addrs, store, None).await?;

    println!(
        "{} Hosting {} on {} (broadcast {})",
        "✓".green(),
        session.settings().name.bright_yellow(),
        format!("http://{}", session.local_addr()).bright_blue(),
        endpoint.broadcast.to_string().bright_white()
    );
    println!("  Documents are written under {}", root.display().to_string().bright_white());

    let registry = session.registry();
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    let mut last = registry.snapshot();
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = registry.snapshot();
                if now != last {
                    for (key, entry) in &now {
                        println!(
                            "  {} {} {}",
                            key.peer.as_deref().unwrap_or("-").bright_cyan(),
                            key.file_name.bright_white(),
                            entry.selection.to_string().bright_black()
                        );
                    }
                    last = now;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown().await;
    Ok(())
}

async fn run_discover(config: Config, silence_ms: Option<u64>, json: bool) -> Result<()> {
    let silence = silence_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.discovery_silence());

    if !json {
        println!("{}", "🔍 Looking for sessions...".cyan().bold());
    }
    let candidates = discovery::discover(config.port, silence).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
    } else if candidates.is_empty() {
        println!("{}", "No sessions found on the local network".yellow());
    } else {
        for candidate in &candidates {
            println!("  {} {}", "→".bright_blue(), candidate.to_string().bright_white());
        }
    }
    Ok(())
}

async fn run_join(mut config: Config, args: JoinArgs) -> Result<()> {
    if let Some(ms) = args.interval_ms {
        config.publish_interval_ms = ms;
    }

    let host: Ipv4Addr = match &args.host {
        Some(addr) => select_session(&[], &Selection::Manual(addr.clone()))?
            .context("no host address given")?,
        None => {
            println!("{}", "🔍 Looking for sessions...".cyan().bold());
            let candidates = discovery::discover(config.port, config.discovery_silence()).await?;
            match select_session(&candidates, &Selection::ByName(args.session.clone()))? {
                Some(host) => host,
                None => bail!(
                    "session `{}` not found ({} seen); pass --host to connect manually",
                    args.session,
                    candidates.len()
                ),
            }
        }
    };

    let mut settings = SessionSettings::new(args.session);
    settings.password = args.password;
    settings.username = args.username;
    if !args.anonymous {
        settings = settings.with_default_username();
    }

    let editor = Arc::new(FileEditor::new(&args.file));
    editor.set_selection(parse_selection(&args.selection)?);

    let session = PeerSession::start(&config, settings, host, editor).await?;
    println!(
        "{} Publishing {} to {}",
        "✓".green(),
        args.file.display().to_string().bright_white(),
        host.to_string().bright_blue()
    );

    tokio::signal::ctrl_c().await?;
    session.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(dir) = cli.log_dir {
        config.log_dir = Some(dir);
    }
    let _guard = init_logging(config.log_dir.as_ref());

    match cli.command {
        Commands::Host(args) => run_host(config, args).await,
        Commands::Discover { silence_ms, json } => run_discover(config, silence_ms, json).await,
        Commands::Join(args) => run_join(config, args).await,
    }
}
