use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use kestrel_flight::connection::{wait_until_connected, wait_until_ready};
use kestrel_flight::landing::observe_landing;
use kestrel_flight::missionplan::import_qgc_plan;
use kestrel_flight::progress::wait_until_mission_complete;
use kestrel_flight::watcher::{spawn_status_text, spawn_watchers};
use kestrel_flight::{sequencer, Maneuver, TaskRegistry};
use kestrel_mav::{Descriptor, MavConfig, MavVehicle};
use kestrel_vehicle::{FencePolygon, HomePosition, Session, SongElement, TuneDescription};

#[derive(Debug, Parser)]
#[command(name = "kestrel", version, about = "Scripted flight tests for a PX4-class vehicle")]
struct Cli {
    /// TOML config; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one scripted maneuver: connect, wait for health, arm, fly, land.
    Fly {
        #[arg(long)]
        maneuver: Maneuver,
        /// Target the simulator endpoint (and launch the bridge if configured).
        #[arg(long)]
        sim: bool,
    },
    /// Stream readings from the serial ranging sensor.
    Sensor,
    /// List every parameter on the vehicle.
    Params,
    /// On-vehicle log files.
    Logs {
        #[command(subcommand)]
        cmd: LogsCmd,
    },
    /// Upload a square inclusion fence around the current position.
    Geofence,
    /// Play a jingle on the vehicle buzzer.
    Tune,
    /// Upload a QGroundControl mission plan, fly it, report progress.
    Mission {
        #[arg(long)]
        plan: PathBuf,
    },
    Doctor,
}

#[derive(Debug, Subcommand)]
enum LogsCmd {
    List,
    Download {
        #[arg(long)]
        id: u16,
        #[arg(long)]
        dest: PathBuf,
    },
}

#[derive(Debug, serde::Deserialize, Default)]
#[serde(default)]
struct Config {
    link: LinkCfg,
    sim: SimCfg,
    sensor: SensorCfg,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct LinkCfg {
    descriptor: String,
    connect_timeout_s: u64,
    /// 0 waits forever; GPS lock outdoors can take a while.
    health_timeout_s: u64,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            descriptor: "udp://:14540".into(),
            connect_timeout_s: 30,
            health_timeout_s: 120,
        }
    }
}

impl LinkCfg {
    fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_s)
    }

    fn health_timeout(&self) -> Option<Duration> {
        (self.health_timeout_s > 0).then(|| Duration::from_secs(self.health_timeout_s))
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct SimCfg {
    /// Bridge process to launch for `--sim`; the listen port is appended.
    bridge_cmd: Option<String>,
    port: u16,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self { bridge_cmd: None, port: 14540 }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default)]
struct SensorCfg {
    dev: Option<String>,
    baud: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self { dev: None, baud: kestrel_sensor::DEFAULT_BAUD }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let Some(path) = path else { return Ok(Config::default()) };
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;

    match cli.cmd {
        Command::Fly { maneuver, sim } => fly(&cfg, maneuver, sim).await?,
        Command::Sensor => sensor(&cfg).await?,
        Command::Params => params(&cfg).await?,
        Command::Logs { cmd } => logs(&cfg, cmd).await?,
        Command::Geofence => geofence(&cfg).await?,
        Command::Tune => tune(&cfg).await?,
        Command::Mission { plan } => mission(&cfg, &plan).await?,
        Command::Doctor => doctor(&cfg)?,
    }
    Ok(())
}

fn descriptor(cfg: &Config, sim: bool) -> Result<Descriptor> {
    if sim {
        return Ok(Descriptor::Udp { host: None, port: cfg.sim.port });
    }
    cfg.link
        .descriptor
        .parse()
        .with_context(|| format!("link.descriptor '{}'", cfg.link.descriptor))
}

fn spawn_bridge(cmd: &str, port: u16) -> Result<tokio::process::Child> {
    let mut parts = cmd.split_whitespace();
    let program = parts.next().context("sim.bridge_cmd is empty")?;
    info!(cmd, port, "launching simulator bridge");
    tokio::process::Command::new(program)
        .args(parts)
        .arg(port.to_string())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawn simulator bridge '{cmd}'"))
}

/// Connect the MAVLink backend and block until the vehicle is heard from.
async fn open_session(cfg: &Config, descriptor: &Descriptor) -> Result<Session> {
    let vehicle = MavVehicle::connect(descriptor, MavConfig::default()).await?;
    let session = vehicle.session();
    wait_until_connected(&*session.telemetry, cfg.link.connect_timeout()).await?;
    Ok(session)
}

async fn fly(cfg: &Config, maneuver: Maneuver, sim: bool) -> Result<()> {
    // Held for the whole flight; dropping it kills the bridge.
    let _bridge = match (&cfg.sim.bridge_cmd, sim) {
        (Some(cmd), true) => Some(spawn_bridge(cmd, cfg.sim.port)?),
        _ => None,
    };

    let descriptor = descriptor(cfg, sim)?;
    let session = open_session(cfg, &descriptor).await?;

    let mut registry = TaskRegistry::new();
    spawn_status_text(&session, &mut registry);

    wait_until_ready(&*session.telemetry, cfg.link.health_timeout()).await?;

    spawn_watchers(&session, &mut registry);
    let in_air = session.telemetry.in_air();
    registry.spawn("landing-observer", async move {
        observe_landing(in_air, || info!("touchdown confirmed")).await;
    });

    let outcome = sequencer::run(&session, maneuver).await;
    registry.shutdown().await;
    outcome?;
    Ok(())
}

async fn sensor(cfg: &Config) -> Result<()> {
    let dev = cfg.sensor.dev.as_ref().context("sensor.dev missing from config")?;
    kestrel_sensor::run(dev, cfg.sensor.baud).await
}

async fn params(cfg: &Config) -> Result<()> {
    let session = open_session(cfg, &descriptor(cfg, false)?).await?;
    let all = session.param.all_params().await?;
    println!("{} int params, {} float params", all.int_params.len(), all.float_params.len());
    for p in &all.int_params {
        println!("{} = {}", p.name, p.value);
    }
    for p in &all.float_params {
        println!("{} = {}", p.name, p.value);
    }
    Ok(())
}

async fn logs(cfg: &Config, cmd: LogsCmd) -> Result<()> {
    let session = open_session(cfg, &descriptor(cfg, false)?).await?;
    match cmd {
        LogsCmd::List => {
            let entries = session.logs.entries().await?;
            println!("{} log files", entries.len());
            for e in &entries {
                match &e.date {
                    Some(date) => println!("id={} date={} size={}B", e.id, date, e.size_bytes),
                    None => println!("id={} date=unknown size={}B", e.id, e.size_bytes),
                }
            }
        }
        LogsCmd::Download { id, dest } => {
            let entries = session.logs.entries().await?;
            let entry = entries
                .iter()
                .find(|e| e.id == id)
                .with_context(|| format!("no log file with id {id}"))?;
            session.logs.download(entry, &dest).await?;
            info!(id, dest = %dest.display(), "log downloaded");
        }
    }
    Ok(())
}

const FENCE_HALF_SIDE_DEG: f64 = 0.0005;

fn home_fence(home: &HomePosition) -> FencePolygon {
    FencePolygon::square_around(home.latitude_deg, home.longitude_deg, FENCE_HALF_SIDE_DEG)
}

async fn geofence(cfg: &Config) -> Result<()> {
    let session = open_session(cfg, &descriptor(cfg, false)?).await?;
    wait_until_ready(&*session.telemetry, cfg.link.health_timeout()).await?;

    let mut rx = session.telemetry.home();
    let home = (*rx.borrow_and_update()).context("no home position")?;
    session.geofence.upload(&[home_fence(&home)]).await?;
    info!("geofence uploaded around home");
    Ok(())
}

async fn tune(cfg: &Config) -> Result<()> {
    use SongElement::*;
    let session = open_session(cfg, &descriptor(cfg, false)?).await?;
    let jingle = TuneDescription {
        elements: vec![
            Duration4, NoteC, NoteE, NoteG, OctaveUp, NoteC, Duration2, NotePause, OctaveDown,
            Duration8, NoteG, NoteE, Duration2, NoteC,
        ],
        tempo: 200,
    };
    session.tune.play(&jingle).await?;
    info!("tune sent");
    Ok(())
}

async fn mission(cfg: &Config, plan: &std::path::Path) -> Result<()> {
    let items = import_qgc_plan(plan)?;
    info!(waypoints = items.len(), plan = %plan.display(), "plan imported");

    let session = open_session(cfg, &descriptor(cfg, false)?).await?;
    wait_until_ready(&*session.telemetry, cfg.link.health_timeout()).await?;

    session.mission.upload(&items).await?;
    session.action.arm().await?;
    session.mission.start().await?;

    wait_until_mission_complete(&*session.telemetry).await;
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    let d = descriptor(cfg, false)?;
    info!(descriptor = %d, "doctor: link descriptor OK");
    anyhow::ensure!(cfg.link.connect_timeout_s > 0, "link.connect_timeout_s must be positive");

    if let Some(cmd) = &cfg.sim.bridge_cmd {
        anyhow::ensure!(!cmd.trim().is_empty(), "sim.bridge_cmd is empty");
    }
    if let Some(dev) = &cfg.sensor.dev {
        anyhow::ensure!(!dev.is_empty(), "sensor.dev is empty");
        anyhow::ensure!(cfg.sensor.baud > 0, "sensor.baud invalid");
    }

    info!("doctor: OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_square_is_centered_on_home() {
        let home = HomePosition {
            latitude_deg: 47.398,
            longitude_deg: 8.5456,
            absolute_altitude_m: 488.0,
        };
        let fence = home_fence(&home);
        assert_eq!(fence.points.len(), 4);
        for p in &fence.points {
            let dlat = (p.latitude_deg - home.latitude_deg).abs();
            let dlon = (p.longitude_deg - home.longitude_deg).abs();
            assert!((dlat - FENCE_HALF_SIDE_DEG).abs() < 1e-9);
            assert!((dlon - FENCE_HALF_SIDE_DEG).abs() < 1e-9);
        }
    }
}
