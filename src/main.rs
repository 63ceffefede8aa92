use color_eyre::Result;
use ffwheel::config::default_config_path;
use ffwheel::{ControlMode, ControlSignals, Gear, InputConfiguration, VehicleLimits, WheelInput};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const TICK: Duration = Duration::from_millis(20);

type HostWheel = WheelInput<watch::Receiver<VehicleLimits>, watch::Receiver<ControlMode>>;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => default_config_path()?,
    };
    InputConfiguration::ensure_default_config(&config_path).await?;
    let config = InputConfiguration::load(&config_path).await?;

    let (vehicle_tx, vehicle_rx) = watch::channel(VehicleLimits::default());
    let (_mode_tx, mode_rx) = watch::channel(ControlMode::Manual);

    let wheel = WheelInput::initialize(config, vehicle_rx, mode_rx);
    info!("Running wheel input on {}", wheel.device_name());

    let ticks = run(wheel, vehicle_tx, tokio::signal::ctrl_c()).await;
    info!("Wheel input stopped after {} ticks", ticks);
    Ok(())
}

// Ticks the wheel until `shutdown` resolves, then closes it. Returns the number of ticks run.
async fn run<F: Future>(
    mut wheel: HostWheel,
    vehicle_tx: watch::Sender<VehicleLimits>,
    shutdown: F,
) -> u64 {
    let mut signals = wheel.subscribe();
    let mut ticker = tokio::time::interval(TICK);
    let mut ticks = 0;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ticks += 1;
                if wheel.update_inputs() {
                    info!("Driver took over from autonomous control");
                }
                if signals.has_changed().unwrap_or(false) {
                    let snapshot = signals.borrow_and_update().clone();
                    debug!(
                        "gear={:?} accel={:.2} steer={:.2} torque={:.2}",
                        snapshot.gear, snapshot.acceleration, snapshot.steer_angle, wheel.last_torque()
                    );
                }
                let snapshot = wheel.signals();
                vehicle_tx.send_modify(|vehicle| integrate_speed(vehicle, &snapshot));
            }
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    wheel.close();
    ticks
}

// Crude kinematic stand-in for the vehicle model so force feedback has a speed to work with
fn integrate_speed(vehicle: &mut VehicleLimits, signals: &ControlSignals) {
    let dt = TICK.as_secs_f32();
    vehicle.speed = match signals.gear {
        Gear::Drive => (vehicle.speed + signals.acceleration * dt).max(0.0),
        Gear::Reverse => (vehicle.speed - signals.acceleration * dt).min(0.0),
        Gear::Parking | Gear::Neutral => vehicle.speed * 0.98,
    };
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok()))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

fn log_filter(directives: Option<String>) -> EnvFilter {
    EnvFilter::new(directives.as_deref().unwrap_or("info"))
}
