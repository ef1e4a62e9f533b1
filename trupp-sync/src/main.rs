use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, eyre};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trupp_channel::{EventChannel, LocalBus, StreamChannel, run_tcp_client, serve_tcp};
use trupp_core::{Catalog, ConnectionConfig, CurrentStatus, StatusCode, Surface};
use trupp_sync::{
    ChannelConfig, Config, HttpStatusReporter, MemoryStore, SelectionOutcome, SqliteStore,
    StatusController, StatusMachine, StatusStore, StatusSurface, StoreConfig, SurfaceView,
    TcpRole,
};

/// How long a one-shot `select` waits for its notification to go out.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "trupp-sync")]
#[command(about = "Keeps the operator status in sync between the car and the phone")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "trupp-sync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store dispatch server connection settings. Omitted fields keep their
    /// current value.
    Configure {
        #[arg(long)]
        protocol: Option<String>,
        /// Host, optionally with a port
        #[arg(long)]
        server: Option<String>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        issi: Option<String>,
    },
    /// Print the stored settings and the last confirmed status
    Show {
        #[arg(long, value_enum, default_value_t = SurfaceArg::Mobile)]
        surface: SurfaceArg,
    },
    /// Report one status and exit; the exit code reflects the outcome
    Select {
        code: StatusCode,
        #[arg(long, value_enum, default_value_t = SurfaceArg::Mobile)]
        surface: SurfaceArg,
    },
    /// Run surfaces interactively; type `3` or `car 3` to select
    Run {
        #[arg(long, value_enum, default_value_t = SurfacesArg::Both)]
        surface: SurfacesArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SurfaceArg {
    Car,
    Mobile,
}

impl From<SurfaceArg> for Surface {
    fn from(arg: SurfaceArg) -> Self {
        match arg {
            SurfaceArg::Car => Surface::Car,
            SurfaceArg::Mobile => Surface::Mobile,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SurfacesArg {
    Car,
    Mobile,
    Both,
}

impl SurfacesArg {
    fn surfaces(self) -> Vec<Surface> {
        match self {
            SurfacesArg::Car => vec![Surface::Car],
            SurfacesArg::Mobile => vec![Surface::Mobile],
            SurfacesArg::Both => vec![Surface::Mobile, Surface::Car],
        }
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "trupp_sync=info,trupp_channel=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    match &config.store {
        StoreConfig::Memory { namespace } => {
            info!(namespace, "Using in-memory store");
            let store = MemoryStore::new(namespace);
            run_command(cli.command, &config, store).await
        }
        StoreConfig::Sqlite { path, namespace } => {
            info!(?path, namespace, "Using SQLite store");
            let store = SqliteStore::new(path, namespace).await?;
            let result = run_command(cli.command, &config, store.clone()).await;
            store.close().await;
            result
        }
    }
}

async fn run_command<S>(command: Command, config: &Config, store: S) -> color_eyre::Result<()>
where
    S: StatusStore + Clone,
{
    match command {
        Command::Configure {
            protocol,
            server,
            token,
            issi,
        } => {
            let update = ConnectionConfig {
                protocol,
                server,
                token,
                issi,
            };
            store.save_connection_config(&update).await?;

            let stored = store.load_connection_config().await?;
            match stored.missing_field() {
                Some(field) => warn!(missing = %field, "Connection settings still incomplete"),
                None => info!("Connection settings complete"),
            }
            println!("{stored:?}");
            Ok(())
        }
        Command::Show { surface } => {
            let surface = Surface::from(surface);
            let settings = store.load_connection_config().await?;
            let current = store
                .load_last_status()
                .await?
                .unwrap_or_else(|| CurrentStatus::restored(config.default_status));
            if let Some(at) = current.confirmed_at {
                println!("last confirmed at {at}");
            }

            let snapshot = StatusMachine::new(current).snapshot();
            println!("{settings:?}");
            print!(
                "{}",
                SurfaceView::render(surface, &catalog_for(surface, config), &snapshot)
            );
            Ok(())
        }
        Command::Select { code, surface } => {
            let surface = Surface::from(surface);
            let cancel = CancellationToken::new();
            match &config.channel {
                ChannelConfig::Local => {
                    select_once(surface, code, config, store, LocalBus::new(), cancel).await
                }
                ChannelConfig::Tcp { addr, role } => {
                    let channel = StreamChannel::new();
                    let mut link = None;
                    if *role == TcpRole::Connect {
                        // one attempt is enough, delivery is best effort anyway
                        match TcpStream::connect(addr).await {
                            Ok(stream) => link = Some(channel.attach(stream, cancel.clone())),
                            Err(e) => warn!(%addr, error = %e, "Counterpart not reachable"),
                        }
                    } else {
                        warn!("One-shot select does not accept connections, counterpart will not be notified");
                    }

                    let result =
                        select_once(surface, code, config, store, channel.clone(), cancel.child_token())
                            .await;
                    if let Some(link) = link {
                        channel.detach();
                        if tokio::time::timeout(FLUSH_TIMEOUT, link).await.is_err() {
                            warn!("Counterpart did not take the notification in time");
                        }
                    }
                    cancel.cancel();
                    result
                }
            }
        }
        Command::Run { surface } => {
            let cancel = CancellationToken::new();
            match &config.channel {
                ChannelConfig::Local => {
                    run_surfaces(surface.surfaces(), config, store, LocalBus::new(), cancel).await
                }
                ChannelConfig::Tcp { addr, role } => {
                    let channel = StreamChannel::new();
                    let transport = spawn_transport(channel.clone(), *addr, *role, cancel.clone()).await?;
                    let result =
                        run_surfaces(surface.surfaces(), config, store, channel, cancel).await;
                    let _ = transport.await;
                    result
                }
            }
        }
    }
}

fn catalog_for(surface: Surface, config: &Config) -> Catalog {
    match surface {
        Surface::Car => config.car.catalog(),
        Surface::Mobile => Catalog::all(),
    }
}

async fn spawn_transport(
    channel: StreamChannel,
    addr: std::net::SocketAddr,
    role: TcpRole,
    cancel: CancellationToken,
) -> color_eyre::Result<JoinHandle<()>> {
    Ok(match role {
        TcpRole::Listen => {
            let listener = TcpListener::bind(addr).await?;
            info!(%addr, "Waiting for counterpart");
            tokio::spawn(serve_tcp(channel, listener, cancel))
        }
        TcpRole::Connect => tokio::spawn(run_tcp_client(channel, addr, cancel)),
    })
}

async fn select_once<S, C>(
    surface: Surface,
    code: StatusCode,
    config: &Config,
    store: S,
    channel: C,
    cancel: CancellationToken,
) -> color_eyre::Result<()>
where
    S: StatusStore,
    C: EventChannel,
{
    let controller = StatusController::new(
        surface,
        store,
        HttpStatusReporter::new(),
        channel,
        config.default_status,
    )
    .await;
    let view = StatusSurface::new(controller.handle(), catalog_for(surface, config));
    let task = controller.spawn(cancel.clone());

    let outcome = view.tap(code).await?.outcome().await?;
    print!("{}", view.view());

    cancel.cancel();
    let _ = task.await;

    match outcome {
        SelectionOutcome::Confirmed(_) => Ok(()),
        SelectionOutcome::ConfigurationMissing(field) => {
            bail!("connection setting '{field}' is not configured, run `trupp-sync configure`")
        }
        SelectionOutcome::StoreUnavailable(e) => Err(eyre!("could not read settings: {e}")),
        SelectionOutcome::Failed(e) => Err(e.into()),
        SelectionOutcome::Superseded => Err(eyre!("status {code} was superseded")),
    }
}

async fn run_surfaces<S, C>(
    surfaces: Vec<Surface>,
    config: &Config,
    store: S,
    channel: C,
    cancel: CancellationToken,
) -> color_eyre::Result<()>
where
    S: StatusStore + Clone,
    C: EventChannel + Clone,
{
    let mut views = Vec::new();
    let mut tasks = Vec::new();

    for surface in surfaces {
        let controller = StatusController::new(
            surface,
            store.clone(),
            HttpStatusReporter::new(),
            channel.clone(),
            config.default_status,
        )
        .await;
        let view = StatusSurface::new(controller.handle(), catalog_for(surface, config));
        tasks.push(controller.spawn(cancel.clone()));
        tasks.push(tokio::spawn(print_changes(view.clone(), cancel.clone())));
        print!("{}", view.view());
        views.push(view);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "q" || line == "quit" {
                    break;
                }
                match parse_input(line, &views) {
                    Ok((view, code)) => {
                        // the printer task shows the outcome
                        if let Err(e) = view.tap(code).await {
                            warn!(error = %e, "Selection refused");
                        }
                    }
                    Err(e) => warn!(input = line, error = %e, "Unrecognised input"),
                }
            }
        }
    }

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
    info!("trupp-sync shut down complete");
    Ok(())
}

fn parse_input<'a>(
    line: &str,
    views: &'a [StatusSurface],
) -> color_eyre::Result<(&'a StatusSurface, StatusCode)> {
    let mut parts = line.split_whitespace();
    let (surface, code) = match (parts.next(), parts.next()) {
        (Some(code), None) => (None, code),
        (Some(surface), Some(code)) => (Some(surface.parse::<Surface>().map_err(|e| eyre!(e))?), code),
        _ => bail!("expected `<code>` or `<surface> <code>`"),
    };

    let view = match surface {
        Some(surface) => views
            .iter()
            .find(|v| v.kind() == surface)
            .ok_or_else(|| eyre!("{surface} surface is not running"))?,
        None => views.first().ok_or_else(|| eyre!("no surface is running"))?,
    };
    Ok((view, code.parse()?))
}

async fn print_changes(view: StatusSurface, cancel: CancellationToken) {
    let mut updates = view.subscribe();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                print!("{}", view.view());
            }
        }
    }
}
