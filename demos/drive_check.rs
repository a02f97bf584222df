// Drive board check: careful, step-by-step wheel bring-up
//
// Usage: cargo run --example drive_check -- [port]
// Example: cargo run --example drive_check -- /dev/ttyACM0
//
// Safety features:
// - Explicit confirmation before any writes
// - Very low test duty
// - Wheels zeroed and disabled before exit

use std::io::{self, Write};
use std::thread::sleep;
use std::time::Duration;

use balbot_runtime::bus::{ControlBus, Register, SerialBus};
use balbot_runtime::config::{BOARD_BAUD, BOARD_PORT};
use balbot_runtime::motor::{UNIT_ID_LEFT, UNIT_ID_RIGHT};

const WHEEL_UNITS: [(u8, &str); 2] = [(UNIT_ID_LEFT, "Left"), (UNIT_ID_RIGHT, "Right")];

// 8% of battery voltage, slow enough to grab a runaway wheel
const TEST_DUTY: i16 = 80;

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush().unwrap();
    let mut input = String::new();
    io::stdin().read_line(&mut input).unwrap();
    input.trim().eq_ignore_ascii_case("y")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    // Get port from args or use default
    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| BOARD_PORT.to_string());

    println!("BalBot drive board check (WITH WRITES)");
    println!("  This tool WILL spin the wheels!");
    println!("  Lay the robot on its side, wheels off the ground, before proceeding.");
    println!();
    println!("Serial port: {}", port);
    println!();

    if !confirm("Are the wheels off the ground?") {
        println!("Aborting.");
        return Ok(());
    }

    let mut bus = SerialBus::open(&port, BOARD_BAUD)?;

    // Read-only presence check first
    for (id, name) in WHEEL_UNITS {
        if bus.ping(id)? {
            println!("{} wheel unit {} responding", name, id);
        } else {
            println!("{} wheel unit {} NOT responding, aborting.", name, id);
            return Ok(());
        }
    }

    if !confirm("Spin each wheel briefly at low duty?") {
        println!("Aborting.");
        return Ok(());
    }

    for (id, name) in WHEEL_UNITS {
        println!("Testing {} wheel...", name);

        bus.write_u8(id, Register::DriveEnable, 1)?;
        let before = bus.read_i32(id, Register::EncoderCount)?;

        bus.write_i16(id, Register::DutyCommand, TEST_DUTY)?;
        sleep(Duration::from_millis(500));
        bus.write_i16(id, Register::DutyCommand, 0)?;

        let after = bus.read_i32(id, Register::EncoderCount)?;
        bus.write_u8(id, Register::DriveEnable, 0)?;

        let delta = after - before;
        if delta > 0 {
            println!("  {} wheel moved {} counts forward", name, delta);
        } else if delta < 0 {
            println!("  {} wheel moved {} counts BACKWARD - check wiring polarity", name, delta);
        } else {
            println!("  {} wheel did not move - check the drive stage", name);
        }
    }

    println!();
    println!("Done. Both wheels zeroed and disabled.");
    Ok(())
}
