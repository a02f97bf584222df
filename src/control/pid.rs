// PID with integral clamp

#[derive(Debug, Clone, Copy)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Absolute bound on the accumulated integral term
    pub i_limit: f32,
}

pub struct Pid {
    gains: PidGains,
    integral: f32,
    last_error: f32,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            last_error: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = 0.0;
    }

    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        let p_term = self.gains.kp * error;

        self.integral += self.gains.ki * error * dt;
        self.integral = self.integral.clamp(-self.gains.i_limit, self.gains.i_limit);

        let d_term = if dt > 0.0 {
            self.gains.kd * (error - self.last_error) / dt
        } else {
            0.0
        };
        self.last_error = error;

        p_term + self.integral + d_term
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }
}
