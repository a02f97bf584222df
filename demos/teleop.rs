// Keyboard teleop: W/S forward, A/D turn, R/F speed, Space halt, C resume, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use balbot_runtime::config::{TOPIC_CMD_DRIVE, TOPIC_CMD_HALT, TOPIC_CMD_RESET};
use balbot_runtime::messages::DriveCommand;

const SPEEDS: [f32; 3] = [0.1, 0.25, 0.5]; // m/s
const YAW_SPEEDS: [f32; 3] = [0.5, 1.0, 2.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 150; // Reset velocities after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_drive = session.declare_publisher(TOPIC_CMD_DRIVE).await?;
    let pub_halt = session.declare_publisher(TOPIC_CMD_HALT).await?;
    let pub_reset = session.declare_publisher(TOPIC_CMD_RESET).await?;

    info!("Controls: W/S=forward, A/D=turn, R/F=speed, Space=halt, C=resume, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_drive, &pub_halt, &pub_reset).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    pub_drive: &zenoh::pubsub::Publisher<'_>,
    pub_halt: &zenoh::pubsub::Publisher<'_>,
    pub_reset: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent command state
    let mut cmd = DriveCommand::default();
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Movement - update command and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        cmd.forward = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        cmd.forward = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Turning: positive yaw rate is counter-clockwise
                    KeyCode::Char('a') if pressed => {
                        cmd.yaw_rate = YAW_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        cmd.yaw_rate = -YAW_SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Safety latch
                    KeyCode::Char(' ') if pressed => {
                        info!("HALT");
                        pub_halt.put("{}").await?;
                    }
                    KeyCode::Char('c') if pressed => {
                        info!("Resume");
                        pub_reset.put("{}").await?;
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset the command if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            cmd = DriveCommand::default();
        }

        pub_drive.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}

fn print_speed(speed_idx: usize) {
    let label = match speed_idx {
        0 => "LOW",
        1 => "MEDIUM",
        _ => "HIGH",
    };
    info!("Speed: {}", label);
}
