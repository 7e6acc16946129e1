use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use core::cell::RefCell;
use embassy_executor::{Executor, Spawner};
use embassy_time::{Duration, Instant, Ticker};
use serde::Serialize;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::{error, info, warn};
use xpat_core::mk_static;
use xpat_core::utils::SystemController;
use xpat_core::utils::controllers::{Phase, SETPOINT_CHANNEL, SetpointCommand, ThrottleConfig};

mod plant;

use plant::{EnginePlant, SpeedProbe, ThrottleLever};

type HostSystem = SystemController<SpeedProbe<'static>, ThrottleLever<'static>>;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Profile {
    /// 0.001 base step
    Canonical,
    /// 0.005 base step
    Coarse,
}

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts {
    /// tick period in milliseconds
    #[clap(long, default_value_t = 100)]
    period_ms: u64,
    /// stop after this many seconds (0 runs until killed)
    #[clap(long, default_value_t = 60)]
    duration_secs: u64,
    /// initial target speed, snapped to the 100 grid
    #[clap(long)]
    target: Option<f32>,
    /// engage the loop at startup
    #[clap(long)]
    enable: bool,
    /// tuning profile
    #[clap(long, value_enum, default_value_t = Profile::Canonical)]
    profile: Profile,
    /// JSON file overriding individual tuning values
    #[clap(long)]
    config: Option<PathBuf>,
    /// initial throttle position of the simulated engine
    #[clap(long, default_value_t = 0.3)]
    initial_throttle: f32,
    /// drop every n-th speed reading (0 = never)
    #[clap(long, default_value_t = 0)]
    dropout_every: u32,
}

#[derive(Debug, Default, Serialize)]
struct RunSummary {
    ticks: u64,
    writes: u64,
    skipped: u64,
    final_target: u16,
    final_speed: f32,
    final_throttle: f32,
}

fn load_config(opts: &Opts) -> Result<ThrottleConfig> {
    let config = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<ThrottleConfig>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => match opts.profile {
            Profile::Canonical => ThrottleConfig::default(),
            Profile::Coarse => ThrottleConfig::coarse(),
        },
    };
    config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(config)
}

/// Forward JSON operator commands from stdin, one per line.
fn spawn_operator_input() {
    std::thread::spawn(|| {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<SetpointCommand>(&line) {
                Ok(cmd) => {
                    if SETPOINT_CHANNEL.try_send(cmd).is_err() {
                        warn!("operator queue full, dropping {:?}", cmd);
                    }
                }
                Err(e) => error!(?e, "error deserializing SetpointCommand"),
            }
        }
    });
}

#[embassy_executor::task]
async fn tick_task(
    mut sys: HostSystem,
    engine: &'static RefCell<EnginePlant>,
    period: Duration,
    run_for: Option<Duration>,
) {
    let mut ticker = Ticker::every(period);
    let started = Instant::now();
    let mut last = started;
    let mut summary = RunSummary::default();

    loop {
        ticker.next().await;
        let now = Instant::now();
        let dt = now - last;
        last = now;

        engine.borrow_mut().advance(dt);
        let report = sys.run_tick(dt);

        summary.ticks += 1;
        match report.phase {
            Phase::Adjusting => summary.writes += 1,
            Phase::SignalUnavailable => summary.skipped += 1,
            _ => {}
        }
        if summary.ticks % 10 == 0 || report.write.is_some() {
            let plant = engine.borrow();
            info!(
                target_speed = sys.setpoint.get_target(),
                speed = plant.speed(),
                throttle = plant.throttle(),
                "{}",
                report
            );
        }

        if run_for.is_some_and(|limit| now - started >= limit) {
            break;
        }
    }

    let plant = engine.borrow();
    summary.final_target = sys.setpoint.get_target();
    summary.final_speed = plant.speed();
    summary.final_throttle = plant.throttle();
    match serde_json::to_string(&summary) {
        Ok(json) => info!("run summary: {}", json),
        Err(e) => error!(?e, "failed to serialize run summary"),
    }
    std::process::exit(0);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts: Opts = Opts::parse();
    let config = load_config(&opts)?;
    info!(?config, "throttle tuning");

    let engine: &'static RefCell<EnginePlant> = mk_static!(
        RefCell<EnginePlant>,
        RefCell::new(EnginePlant::new(opts.initial_throttle, opts.dropout_every))
    );
    let mut sys = SystemController::new(config, SpeedProbe(engine), ThrottleLever(engine))
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    if let Some(target) = opts.target {
        sys.setpoint.set_target(target);
    }
    sys.setpoint.set_enabled(opts.enable);

    spawn_operator_input();
    info!(r#"operator input: {{"sc":"set","t":1500}}, {{"sc":"up"}}, {{"sc":"down"}}, {{"sc":"toggle"}}"#);

    let period = Duration::from_millis(opts.period_ms.max(1));
    let run_for = (opts.duration_secs > 0).then(|| Duration::from_secs(opts.duration_secs));

    let executor: &'static mut Executor = mk_static!(Executor, Executor::new());
    executor.run(move |spawner: Spawner| {
        if let Err(e) = spawner.spawn(tick_task(sys, engine, period, run_for)) {
            error!(?e, "failed to spawn tick task");
        }
    })
}
