// Balance and yaw control

mod balance;
mod pid;

pub use balance::{BalanceController, ControlMode};
pub use pid::{Pid, PidGains};
