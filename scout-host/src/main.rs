//! Host-side binary: listens for a device link, runs the session
//! manager against it, and drives everything from an interactive
//! operator prompt.

mod audit;
mod session;
mod store;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use clap::Parser;
use scout_core::{DeviceCommand, StatusCode};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use audit::AuditLog;
use session::{AuditHook, Observer, Session, SessionEvent};
use store::WifiStore;

#[derive(Debug, Parser)]
#[command(name = "scout-host", about = "SMB subnet scout, host side")]
struct Args {
    /// Address to accept the device link on.
    #[arg(long, default_value = "127.0.0.1:7445")]
    listen: String,

    /// Named Wi-Fi credential store.
    #[arg(long, default_value = "wifi_config.json")]
    store: PathBuf,

    /// Audit trail file.
    #[arg(long, default_value = "scan_log.txt")]
    log: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let store = Arc::new(Mutex::new(WifiStore::load(&args.store)));
    let audit_log = Arc::new(AuditLog::new(args.log.clone()));
    let audit: AuditHook = {
        let audit_log = audit_log.clone();
        Arc::new(move |line: &str| audit_log.append(line))
    };

    let observers: Arc<Vec<Observer>> = Arc::new(vec![Box::new(render_event)]);

    let listener = TcpListener::bind(&args.listen).await?;
    info!(listen = %args.listen, "waiting for device link");
    print_help();

    let mut session: Option<Session> = None;
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                if session.as_ref().is_some_and(|s| s.is_attached()) {
                    warn!(%peer, "rejecting second device link");
                    continue;
                }
                info!(%peer, "device attached");
                session = Some(Session::attach(stream, observers.clone(), audit.clone()));
            }

            line = stdin.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed, exiting");
                    break;
                };
                if !handle_operator_line(line.trim(), &session, &store, &audit).await {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Handle one operator line. Returns `false` to exit.
async fn handle_operator_line(
    line: &str,
    session: &Option<Session>,
    store: &Arc<Mutex<WifiStore>>,
    audit: &AuditHook,
) -> bool {
    if line.is_empty() {
        return true;
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens[0] {
        "exit" | "quit" | "q" => {
            info!("exit requested");
            return false;
        }
        "help" => print_help(),
        "status" => {
            match session {
                Some(s) => {
                    let status = s.status();
                    info!(
                        attached = status.attached,
                        cycle_open = status.cycle_open,
                        last_status = ?status.last_status,
                        "session status"
                    );
                }
                None => info!("no device has attached yet"),
            }
            let saved = store.lock().expect("store poisoned").len();
            info!(saved_networks = saved, "credential store");
        }
        "networks" => {
            let store = store.lock().expect("store poisoned");
            if store.is_empty() {
                info!("no networks saved");
            } else {
                for (index, ssid) in store.ssids().enumerate() {
                    info!("[{}] {}", index, ssid);
                }
            }
        }
        "join" => match parse_join(&tokens[1..], store) {
            Ok(command) => forward(session, command, audit).await,
            Err(msg) => warn!("{}", msg),
        },
        "scan" => match parse_scan(&tokens[1..]) {
            Ok(command) => forward(session, command, audit).await,
            Err(msg) => warn!("{}", msg),
        },
        "randomize_mac" | "randomise_mac" => {
            forward(session, DeviceCommand::RandomizeMac, audit).await
        }
        "reboot" => forward(session, DeviceCommand::Reboot, audit).await,
        other => warn!("unknown command '{}'; type 'help'", other),
    }
    true
}

/// `join -s <ssid> -p <password>` or `join -i <index>`; new credentials
/// are persisted to the store.
fn parse_join(args: &[&str], store: &Arc<Mutex<WifiStore>>) -> Result<DeviceCommand, String> {
    let mut ssid = None;
    let mut password = None;
    let mut index = None;

    let mut it = args.iter();
    while let Some(token) = it.next() {
        match *token {
            "-s" | "--ssid" => ssid = it.next().copied(),
            "-p" | "--password" => password = it.next().copied(),
            "-i" | "--index" => {
                index = Some(
                    it.next()
                        .and_then(|t| t.parse::<usize>().ok())
                        .ok_or("usage: join -i <index>")?,
                )
            }
            other => return Err(format!("unknown option '{}'", other)),
        }
    }

    if let Some(index) = index {
        let store = store.lock().expect("store poisoned");
        let (ssid, password) = store
            .by_index(index)
            .ok_or_else(|| format!("no saved network at index {}", index))?;
        return Ok(DeviceCommand::Join {
            ssid: ssid.to_string(),
            password: password.to_string(),
        });
    }

    match (ssid, password) {
        (Some(ssid), Some(password)) => {
            let mut store = store.lock().expect("store poisoned");
            if store.upsert(ssid, password) {
                if let Err(e) = store.save() {
                    warn!(%e, "could not persist credentials");
                } else {
                    info!(ssid, "network saved");
                }
            }
            Ok(DeviceCommand::Join {
                ssid: ssid.to_string(),
                password: password.to_string(),
            })
        }
        _ => Err("usage: join -s <ssid> -p <password> | join -i <index>".to_string()),
    }
}

fn parse_scan(args: &[&str]) -> Result<DeviceCommand, String> {
    match args {
        ["-all"] | ["--all"] => Ok(DeviceCommand::ScanAll),
        ["-t", addr] => Ipv4Addr::from_str(addr)
            .map(DeviceCommand::ScanTarget)
            .map_err(|_| format!("invalid IPv4 address '{}'", addr)),
        _ => Err("usage: scan -all | scan -t <ipv4>".to_string()),
    }
}

async fn forward(session: &Option<Session>, command: DeviceCommand, audit: &AuditHook) {
    let Some(s) = session.as_ref().filter(|s| s.is_attached()) else {
        warn!("no device attached");
        return;
    };
    match s.send_command(command.clone(), audit).await {
        Ok(busy) => {
            if busy {
                warn!("a scan cycle is still open on the device; it may reject this");
            }
            info!(%command, "command sent");
        }
        Err(e) => warn!(%e, "command could not be sent"),
    }
}

/// Render decoded device events the way the operator expects to read
/// them.
fn render_event(event: &SessionEvent) {
    match event {
        SessionEvent::Report(report) => match report.status {
            StatusCode::WifiConnectSuccess => {
                info!("device joined network, ip {}", report.target)
            }
            StatusCode::WifiConnectFailure => warn!("device failed to join network"),
            StatusCode::ScanningTarget => info!("[scan] probing {}", report.target),
            StatusCode::PortOpen => info!("[scan] {} | TCP/445 open", report.target),
            StatusCode::ServiceResponded => {
                info!("[scan] {} | SMB negotiation successful", report.target)
            }
            StatusCode::ServiceNoResponse => warn!("[scan] {} | no SMB response", report.target),
            StatusCode::TargetUnreachable => warn!("[scan] {} | host unreachable", report.target),
            StatusCode::ScanCycleStart => info!("[scan] cycle started"),
            StatusCode::ScanCycleEnd => info!("[scan] cycle completed"),
            StatusCode::DeviceReady => info!("device ready for commands"),
        },
        SessionEvent::Detached { unfinished } => {
            if *unfinished {
                warn!("device detached mid-scan; last cycle never completed");
            } else {
                info!("device detached");
            }
        }
    }
}

fn print_help() {
    let commands = [
        ("help", "Show this message."),
        ("join -s <ssid> -p <pass>", "Join using provided credentials."),
        ("join -i <index>", "Join a saved network."),
        ("networks", "List saved networks."),
        ("scan -all", "Scan the device's current subnet."),
        ("scan -t <ipv4>", "Probe a single IPv4 host."),
        ("randomize_mac", "Randomize the device MAC before next join."),
        ("status", "Show session status."),
        ("reboot", "Reboot the device."),
        ("exit", "Stop the host."),
    ];
    println!("\nAvailable commands:");
    for (command, description) in commands {
        println!("  {:<28}{}", command, description);
    }
    println!();
}
