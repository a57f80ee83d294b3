use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use herald::Herald;
use herald::config::{HeraldConfig, load_config};
use herald::monitor::clock::Clock;
use herald::monitor::service::{ServiceAddress, ServiceId};
use herald::notifications::senders::{NotificationSender, build_sender, log::LogSender};
use herald::notifications::service::NotificationService;
use herald::ping::poller::{ServicePoller, StatusPoller};
use herald::store::FileStore;
use herald::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "herald.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the roster until interrupted
    Run,
    /// Add a service to the roster
    Add {
        #[arg(long)]
        host: String,
        #[arg(long)]
        name: String,
        /// Poll interval in ticks; zero or less uses the default
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        interval: i64,
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a service from the roster
    Remove { id: u64 },
    /// Change a service's settings
    Set {
        id: u64,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        interval: Option<i64>,
        #[arg(long)]
        enabled: Option<bool>,
        /// Toggle notifications for the whole roster
        #[arg(long)]
        notifying: Option<bool>,
    },
    /// Print the roster
    List,
    /// Poll every enabled service once, then print the roster
    Refresh,
    /// Poll one address and print the result
    Ping { address: String },
}

fn init_logging(log_dir: &str, default_filter: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "herald.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

fn build_senders(config: &HeraldConfig) -> Vec<Box<dyn NotificationSender>> {
    let mut senders: Vec<Box<dyn NotificationSender>> = vec![Box::new(LogSender)];
    for channel in &config.channels {
        match build_sender(channel) {
            Ok(sender) => senders.push(sender),
            Err(e) => error!(channel = channel.kind(), error = %e, "Skipping misconfigured notification channel."),
        }
    }
    senders
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    let default_filter = match args.command {
        Command::Run => "info",
        _ => "warn",
    };
    init_logging(&config.log_dir, default_filter);
    info!(version = VERSION, config = %args.config, "Starting herald.");

    let poller: Arc<dyn ServicePoller> = Arc::new(StatusPoller::new(config.poll_timeout()));

    if let Command::Ping { address } = &args.command {
        let address = ServiceAddress::parse(address)?;
        let snapshot = poller.poll(&address).await?;
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let senders = match args.command {
        Command::Run => build_senders(&config),
        _ => vec![Box::new(LogSender) as Box<dyn NotificationSender>],
    };
    let (notifications, notification_handle) =
        NotificationService::start(senders, config.notification_spacing(), shutdown_rx.clone());
    let herald = Arc::new(Herald::open(
        &config,
        poller,
        Arc::new(notifications),
        Arc::new(FileStore::new(&config.roster_path)),
    ));

    match args.command {
        Command::Run => {
            run(&config, Arc::clone(&herald), notification_handle, shutdown_tx, shutdown_rx).await;
        }
        Command::Add {
            host,
            name,
            interval,
            disabled,
        } => {
            let id = herald.add_service(&host, &name, !disabled, interval).await?;
            println!("Added service {id}.");
        }
        Command::Remove { id } => {
            herald.remove_service(ServiceId(id)).await?;
            println!("Removed service {id}.");
        }
        Command::Set {
            id,
            host,
            name,
            interval,
            enabled,
            notifying,
        } => {
            let id = ServiceId(id);
            if let Some(host) = host {
                herald.set_host(id, &host).await?;
            }
            if let Some(name) = name {
                herald.set_name(id, &name).await?;
            }
            if let Some(interval) = interval {
                let applied = herald.set_interval(id, interval).await?;
                println!("Interval set to {applied} ticks.");
            }
            if let Some(enabled) = enabled {
                herald.set_enabled(id, enabled).await?;
            }
            if let Some(notifying) = notifying {
                herald.set_notifying(notifying).await;
            }
        }
        Command::List => print_roster(&herald).await,
        Command::Refresh => {
            let summary = herald.refresh_all().await;
            println!(
                "Polled {} services ({} timed out).",
                summary.polled, summary.abandoned
            );
            print_roster(&herald).await;
        }
        Command::Ping { .. } => {}
    }

    Ok(())
}

async fn print_roster(herald: &Herald) {
    println!("Notifications: {}", if herald.notifying().await { "on" } else { "off" });
    for view in herald.snapshot().await {
        let service = &view.service;
        println!(
            "{:>4}  {:<3}  {:<24}  {:<32}  every {:>3}  {}",
            service.id,
            if service.enabled { "on" } else { "off" },
            service.name,
            service.address,
            service.interval,
            service.players_label(),
        );
    }
}

async fn run(
    config: &HeraldConfig,
    herald: Arc<Herald>,
    notification_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<()>,
    shutdown_rx: watch::Receiver<()>,
) {
    let clock = Clock::new(config.tick_period());
    let clock_handle = tokio::spawn(clock.run(Arc::clone(&herald), shutdown_rx));
    let mut handles = vec![clock_handle, notification_handle];
    info!(services = herald.snapshot().await.len(), "Herald running. Press Ctrl-C to stop.");

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for Ctrl-C.");
            }
            info!("Shutdown requested.");
            None
        }
        (result, index, _) = futures::future::select_all(handles.iter_mut()) => {
            match result {
                Ok(()) => warn!(task = index, "A core task ended unexpectedly."),
                Err(join_error) => error!(task = index, error = ?join_error, "A core task panicked."),
            }
            Some(index)
        }
    };
    // A completed handle must not be awaited again.
    if let Some(index) = finished {
        handles.remove(index);
    }

    if shutdown_tx.send(()).is_err() {
        warn!("All tasks already stopped.");
    }
    for result in futures::future::join_all(handles).await {
        if let Err(join_error) = result {
            error!(error = ?join_error, "Task ended with an error.");
        }
    }

    herald.persist().await;
    info!("Roster saved. Goodbye.");
}
