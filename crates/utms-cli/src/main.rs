use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use utms_proto::command::{ConnectRequest, GotoRequest, ModeRequest, Operation, TakeoffRequest};
use utms_proto::ports::{AutoConnect, PortScan};
use utms_relay::doctor;
use utms_relay::forward::Forwarder;
use utms_relay::invoke::{ProcessInvoker, SubCommand};
use utms_relay::{Relay, RelayConfig};

#[derive(Debug, Parser)]
#[command(name = "utms", version, about = "UTMS ground station relay")]
struct Cli {
    /// TOML config; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the REST + WebSocket relay until Ctrl-C.
    Serve,
    Doctor,
    Ports { #[command(subcommand)] cmd: PortsCmd },
    /// Poll telemetry once and print it.
    Telemetry,
    /// Send one command straight to the control service.
    Vehicle { #[command(subcommand)] cmd: VehicleCmd },
}

#[derive(Debug, Subcommand)]
enum VehicleCmd {
    Connect {
        #[arg(long)]
        port: Option<String>,
        #[arg(long)]
        baud: Option<u32>,
    },
    Disconnect,
    Arm,
    Disarm,
    Takeoff {
        /// Metres above home; the controller default applies when omitted.
        #[arg(long)]
        altitude: Option<f64>,
    },
    Land,
    Mode { mode: String },
    Goto {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long)]
        alt: Option<f64>,
    },
}

#[derive(Debug, Subcommand)]
enum PortsCmd {
    /// List serial ports seen by the controller.
    Scan,
    /// Let the controller probe ports/bauds and connect to the first vehicle.
    AutoConnect,
}

fn load_config(path: Option<&str>) -> Result<RelayConfig> {
    let Some(path) = path else { return Ok(RelayConfig::default()); };
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Serve => serve(&cfg).await?,
        Command::Doctor => run_doctor(&cfg).await?,
        Command::Ports { cmd } => ports_cmd(&cfg, cmd).await?,
        Command::Telemetry => telemetry(&cfg).await?,
        Command::Vehicle { cmd } => vehicle_cmd(&cfg, cmd).await?,
    }
    Ok(())
}

async fn serve(cfg: &RelayConfig) -> Result<()> {
    doctor::check_config(cfg)?;
    let relay = Relay::new(cfg).context("build relay")?;
    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("bind {}", cfg.server.bind))?;

    relay
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {:#}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("relay server")?;
    info!("relay: stopped");
    Ok(())
}

async fn run_doctor(cfg: &RelayConfig) -> Result<()> {
    info!("doctor: starting");
    doctor::check_config(cfg)?;

    let fwd = Forwarder::new(&cfg.upstream).context("build http client")?;
    match doctor::probe_upstream(&fwd).await {
        Ok(h) => info!("doctor: control service {} ({})", h.status, h.message),
        Err(e) => warn!("doctor: {:#}", e),
    }

    info!("doctor: OK");
    Ok(())
}

async fn ports_cmd(cfg: &RelayConfig, cmd: PortsCmd) -> Result<()> {
    let invoker = ProcessInvoker::new(&cfg.invoker);
    match cmd {
        PortsCmd::Scan => {
            let v = invoker.invoke(SubCommand::ScanPorts).await?;
            let scan: PortScan = serde_json::from_value(v).context("unexpected scan_ports result")?;
            if !scan.success {
                anyhow::bail!("scan failed: {}", scan.message.unwrap_or_default());
            }
            println!("FOUND: {}", scan.count);
            for p in scan.ports {
                println!(
                    "port={} desc={} mfr={} vid={:?} pid={:?}",
                    p.port,
                    p.description,
                    p.manufacturer.as_deref().unwrap_or("-"),
                    p.vid,
                    p.pid
                );
            }
        }
        PortsCmd::AutoConnect => {
            let v = invoker.invoke(SubCommand::AutoConnect).await?;
            let res: AutoConnect = serde_json::from_value(v).context("unexpected auto_connect result")?;
            match (res.success, res.port) {
                (true, Some(port)) => println!("CHOSEN: {} @ {:?}", port, res.baud),
                _ => println!("CHOSEN: none ({})", res.message.unwrap_or_default()),
            }
        }
    }
    Ok(())
}

async fn telemetry(cfg: &RelayConfig) -> Result<()> {
    let fwd = Forwarder::new(&cfg.upstream).context("build http client")?;
    let snap = fwd.telemetry().await?;
    println!("{}", serde_json::to_string_pretty(&snap)?);
    Ok(())
}

async fn vehicle_cmd(cfg: &RelayConfig, cmd: VehicleCmd) -> Result<()> {
    let fwd = Forwarder::new(&cfg.upstream).context("build http client")?;
    let v = match cmd {
        VehicleCmd::Connect { port, baud } => fwd.send(Operation::Connect, &ConnectRequest { port, baud }).await?,
        VehicleCmd::Disconnect => fwd.call(Operation::Disconnect).await?,
        VehicleCmd::Arm => fwd.call(Operation::Arm).await?,
        VehicleCmd::Disarm => fwd.call(Operation::Disarm).await?,
        VehicleCmd::Takeoff { altitude } => fwd.send(Operation::Takeoff, &TakeoffRequest { altitude }).await?,
        VehicleCmd::Land => fwd.call(Operation::Land).await?,
        VehicleCmd::Mode { mode } => fwd.send(Operation::Mode, &ModeRequest { mode: Some(mode) }).await?,
        VehicleCmd::Goto { lat, lon, alt } => fwd.send(Operation::Goto, &GotoRequest { lat, lon, alt }).await?,
    };
    println!("{}", serde_json::to_string_pretty(&v)?);
    Ok(())
}
