// 100 Hz balance loop with command watchdog
//
// A stale teleop command zeroes the drive *reference*, not the motor output:
// cutting power on a robot that is still balancing is the unsafe action.
// Halt and the fallen latch are the paths that force the wheels to zero, and
// both are checked at the top of every tick before anything else runs.

use std::time::{Duration, Instant};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::bus::SerialBus;
use crate::config::{
    self, BOARD_BAUD, BOARD_PORT, CMD_TIMEOUT, ControllerGains, LOOP_HZ, PhysicalParams,
    TOPIC_CMD_DRIVE, TOPIC_CMD_HALT, TOPIC_CMD_RESET, TOPIC_HEALTH, TOPIC_RT_STATE,
};
use crate::control::BalanceController;
use crate::estimator::StateEstimator;
use crate::imu::Imu;
use crate::messages::{DriveCommand, RuntimeHealth, StateTelemetry};
use crate::motor::{MotorDriver, WheelSide};

/// Serial link options, overridable from the CLI.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub port: String,
    pub baud: u32,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            port: BOARD_PORT.to_string(),
            baud: BOARD_BAUD,
        }
    }
}

pub struct Runtime {
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    cmd_stale: bool,
    halted: bool,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            cmd_stale: true, // Start stale until first cmd
            halted: false,
        }
    }

    /// Process an incoming drive command
    fn on_command(&mut self, cmd: DriveCommand) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Latch the external stop signal
    fn on_halt(&mut self) {
        if !self.halted {
            warn!("Halt commanded, outputs forced to zero");
        }
        self.halted = true;
    }

    /// Clear the halt latch
    fn on_reset(&mut self) {
        if self.halted {
            info!("Halt cleared");
        }
        self.halted = false;
    }

    /// Drive reference for this tick, with the watchdog applied.
    ///
    /// A stale or never-received command degrades to the zero reference
    /// (balance in place); the balance law itself keeps running.
    fn drive_reference(&mut self) -> DriveCommand {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > CMD_TIMEOUT {
            if !self.cmd_stale {
                warn!("Drive command stale ({:?} old), zeroing reference", cmd_age);
            }
            self.cmd_stale = true;
            DriveCommand::default()
        } else if let Some(cmd) = self.latest_cmd {
            self.cmd_stale = false;
            cmd
        } else {
            self.cmd_stale = true;
            DriveCommand::default()
        }
    }

    fn health(&self, upright: bool) -> RuntimeHealth {
        if self.halted {
            RuntimeHealth::Halted
        } else if !upright {
            RuntimeHealth::Fallen
        } else if self.cmd_stale {
            RuntimeHealth::CmdStale
        } else {
            RuntimeHealth::Ok
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Tick overrun accounting. Overruns are recorded, never compensated by
/// catch-up execution.
struct TickStats {
    period: Duration,
    overruns: u32,
    worst: Duration,
}

impl TickStats {
    fn new(period: Duration) -> Self {
        Self {
            period,
            overruns: 0,
            worst: Duration::ZERO,
        }
    }

    /// Record one tick's execution time; true if it overran the period
    fn record(&mut self, elapsed: Duration) -> bool {
        if elapsed > self.worst {
            self.worst = elapsed;
        }
        if elapsed > self.period {
            self.overruns += 1;
            true
        } else {
            false
        }
    }
}

pub async fn run(opts: RuntimeOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening drive board on {} at {} baud", opts.port, opts.baud);
    let bus = SerialBus::open(&opts.port, opts.baud)?;

    let params = PhysicalParams::balbot();
    let gains = ControllerGains::balbot();

    let mut left = MotorDriver::new(
        bus.try_clone()?,
        WheelSide::Left,
        params.encoder_cpr,
        params.battery_voltage,
    );
    let mut right = MotorDriver::new(
        bus.try_clone()?,
        WheelSide::Right,
        params.encoder_cpr,
        params.battery_voltage,
    );
    let mut imu = Imu::new(bus);

    // Absent hardware is fatal; there is nothing to balance without it
    left.init()?;
    right.init()?;
    imu.init()?;

    let mut estimator = StateEstimator::new(&params);
    let mut controller = BalanceController::new(&params, gains);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_drive = session.declare_subscriber(TOPIC_CMD_DRIVE).await?;
    let sub_halt = session.declare_subscriber(TOPIC_CMD_HALT).await?;
    let sub_reset = session.declare_subscriber(TOPIC_CMD_RESET).await?;
    let pub_state = session.declare_publisher(TOPIC_RT_STATE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let dt = config::control_period();
    let period = Duration::from_millis(1000 / LOOP_HZ);
    let mut tick = interval(period);
    // An overrun must never trigger catch-up execution: exactly one
    // iteration per elapsed period, jitter tolerated
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = TickStats::new(period);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}, {}", TOPIC_CMD_DRIVE, TOPIC_CMD_HALT, TOPIC_CMD_RESET);
    info!("Publishing to: {}, {}", TOPIC_RT_STATE, TOPIC_HEALTH);

    loop {
        tick.tick().await;
        let tick_start = Instant::now();

        // 1. Drain all pending commands (non-blocking), keep the latest
        while let Ok(Some(sample)) = sub_drive.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse drive command: {}", e),
            }
        }
        while let Ok(Some(_)) = sub_halt.try_recv() {
            runtime.on_halt();
        }
        while let Ok(Some(_)) = sub_reset.try_recv() {
            runtime.on_reset();
            controller.reset();
        }

        // 2. Emergency stop check: halted or fallen short-circuits both
        //    wheels to zero before anything else happens this tick
        if runtime.halted || !controller.is_upright() {
            // Keep the encoder caches fresh so a resume does not see a
            // velocity jump from the counts that accumulated meanwhile
            left.update(dt);
            right.update(dt);
            left.set_voltage(0.0);
            right.set_voltage(0.0);

            let health_json = serde_json::to_string(&runtime.health(controller.is_upright()))?;
            pub_health.put(health_json).await?;
            continue;
        }

        // 3. Refresh hardware inputs
        left.update(dt);
        right.update(dt);
        let imu_sample = imu.sample();

        // 4. Estimate, control, actuate
        let state = estimator.update(&imu_sample, left.get_velocity(), right.get_velocity(), dt);
        let reference = runtime.drive_reference();
        let command = controller.update(&state, &reference, dt);
        left.set_voltage(command.left);
        right.set_voltage(command.right);

        // 5. Publish telemetry and health
        let telemetry = StateTelemetry {
            pitch: state.pitch,
            pitch_rate: state.pitch_rate,
            yaw_rate: state.yaw_rate,
            velocity: state.velocity,
            left_voltage: command.left,
            right_voltage: command.right,
            upright: controller.is_upright(),
        };
        pub_state.put(serde_json::to_string(&telemetry)?).await?;

        let health_json = serde_json::to_string(&runtime.health(controller.is_upright()))?;
        pub_health.put(health_json).await?;

        if stats.record(tick_start.elapsed()) {
            warn!(
                "Tick overran the {:?} period (worst {:?}, total overruns {})",
                period, stats.worst, stats.overruns
            );
        }
    }
}
