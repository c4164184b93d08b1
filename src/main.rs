//! `remotedeck` command-line front end
//!
//! Reads commands from stdin, submits them to the session worker and prints
//! every event the session publishes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{debug, info};

use remotedeck::commands::{parse_line, render_envelope, Command, HELP};
use remotedeck::config::{AppConfig, ConfigStorage};
use remotedeck::ssh::{
    parse_port, AuthMethod, ConnectConfig, HostKeyPolicy, KnownHostsStore, RusshTransport,
};
use remotedeck::{init_logging, spawn_session_worker, Session, SessionController, SessionState};

#[derive(Parser, Debug)]
#[command(name = "remotedeck", version, about = "Browse, transfer and run commands over SSH/SFTP")]
struct Cli {
    /// Remote host name or address
    host: String,

    /// Remote user name
    #[arg(short = 'u', long = "user")]
    user: String,

    /// SSH port (1-65535)
    #[arg(short = 'p', long = "port")]
    port: Option<String>,

    /// Private key file; password authentication is used without it
    #[arg(short = 'i', long = "identity")]
    identity: Option<PathBuf>,

    /// Read the password (or key passphrase) from this environment variable
    #[arg(long = "password-env", value_name = "VAR")]
    password_env: Option<String>,

    /// Trust and remember keys of hosts missing from known_hosts
    #[arg(long = "accept-new-host-keys")]
    accept_new_host_keys: bool,

    /// Connect timeout in seconds
    #[arg(long = "timeout", value_name = "SECS")]
    timeout: Option<u64>,

    /// Config file (default: ~/.remotedeck/config.json)
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `remotedeck=trace`
    #[arg(long = "log", value_name = "FILTER")]
    log: Option<String>,
}

type InputLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let storage = match &cli.config {
        Some(path) => ConfigStorage::with_path(path),
        None => ConfigStorage::new().context("could not locate the config directory")?,
    };
    let config = storage
        .load()
        .await
        .with_context(|| format!("could not load {}", storage.path().display()))?;

    init_logging(cli.log.as_deref().unwrap_or(&config.log_filter));

    let port = match &cli.port {
        Some(port) => parse_port(port)?,
        None => config.connection.port,
    };

    let known_hosts = KnownHostsStore::open(config.known_hosts_path());
    let transport = RusshTransport::new(known_hosts)
        .with_command_timeout(Duration::from_secs(config.connection.command_timeout_secs));
    let session = Session::new(Arc::new(transport));

    let session_id = uuid::Uuid::new_v4().to_string();
    let (controller, stream) = spawn_session_worker(session, session_id, config.dispatcher.clone());
    let printer = stream.for_each(|envelope| {
        if envelope.event.is_error() {
            eprintln!("{}", render_envelope(&envelope));
        } else {
            println!("{}", render_envelope(&envelope));
        }
    });

    info!("remotedeck ready for {}@{}:{}", cli.user, cli.host, port);
    println!("Type `connect` to open the session, `help` for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&controller).await;
        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };

        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        match command {
            Command::Empty => {}
            Command::Help => println!("{}", HELP),
            Command::Pwd => println!("{}", controller.status().cwd),
            Command::Quit => break,
            Command::Connect => match connect_config(&cli, &config, port, &mut lines).await {
                Ok(connect) => run(&controller, controller.connect(connect)).await,
                Err(e) => eprintln!("error: {:#}", e),
            },
            other => {
                if let Some(operation) = other.to_operation() {
                    run(&controller, controller.submit(operation)).await;
                }
            }
        }
    }

    if controller.status().state != SessionState::Disconnected {
        run(&controller, controller.disconnect()).await;
    }
    controller.shutdown().await;
    drop(controller);
    if let Err(e) = printer.await {
        debug!("Event printer ended abnormally: {}", e);
    }
    Ok(())
}

/// Wait for a submitted operation; its events are printed by the relay task
async fn run(
    controller: &SessionController,
    submitted: Result<remotedeck::OperationTicket, remotedeck::SessionError>,
) {
    match submitted {
        Ok(ticket) => {
            let id = ticket.id();
            if let Err(e) = ticket.await {
                debug!("Operation {} on {} failed: {}", id, controller.session_id(), e);
            }
        }
        // Rejected submissions publish no event
        Err(e) => eprintln!("error [{}]: {}", e.kind().as_str(), e),
    }
}

async fn prompt(controller: &SessionController) {
    let status = controller.status();
    let text = match status.target {
        Some(target) if status.state == SessionState::Connected => {
            format!("{}:{}> ", target, status.cwd)
        }
        _ => "remotedeck> ".to_string(),
    };
    let mut stdout = tokio::io::stdout();
    let written = match stdout.write_all(text.as_bytes()).await {
        Ok(()) => stdout.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        debug!("Could not write prompt: {}", e);
    }
}

async fn connect_config(
    cli: &Cli,
    config: &AppConfig,
    port: u16,
    lines: &mut InputLines,
) -> Result<ConnectConfig> {
    let secret = match &cli.password_env {
        Some(var) => Some(
            std::env::var(var).with_context(|| format!("environment variable {} is not set", var))?,
        ),
        None => None,
    };

    let auth = match &cli.identity {
        Some(key) => AuthMethod::key(key.to_string_lossy(), secret.filter(|s| !s.is_empty())),
        None => {
            let password = match secret {
                Some(password) => password,
                None => read_secret(&format!("Password for {}@{}: ", cli.user, cli.host), lines).await?,
            };
            AuthMethod::password(password)
        }
    };

    let policy = if cli.accept_new_host_keys {
        HostKeyPolicy::AcceptNew
    } else {
        config.connection.host_key_policy
    };

    Ok(ConnectConfig::new(&cli.host, port, &cli.user, auth)
        .with_timeout(cli.timeout.unwrap_or(config.connection.timeout_secs))
        .with_host_key_policy(policy))
}

// Reads from the shared stdin reader; the terminal still echoes the input
async fn read_secret(label: &str, lines: &mut InputLines) -> Result<String> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(label.as_bytes()).await?;
    stderr.flush().await?;
    lines
        .next_line()
        .await?
        .context("stdin closed before a password was entered")
}
