use crate::config::PidGains;
use std::time::Instant;

/// Discrete PID controller.
///
/// Integral, previous error and the timestamp of the last update persist across ticks and
/// are only ever reset by constructing a new controller.
#[derive(Debug, Clone)]
pub struct Pid {
    kp: f32,
    ki: f32,
    kd: f32,
    integral_limit: f32,
    output_limit: f32,
    integral: f32,
    previous_error: f32,
    last_update: Option<Instant>,
}

impl PidGains {
    pub fn build(&self) -> Pid {
        let Self {
            kp,
            ki,
            kd,
            integral_limit,
            output_limit,
        } = *self;
        Pid::new(kp, ki, kd)
            .with_integral_limit(integral_limit)
            .with_output_limit(output_limit)
    }
}

impl Pid {
    /// Unbounded controller; use the `with_*` builders to add limits.
    pub fn new(kp: f32, ki: f32, kd: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral_limit: f32::INFINITY,
            output_limit: f32::INFINITY,
            integral: 0.0,
            previous_error: 0.0,
            last_update: None,
        }
    }

    pub fn with_integral_limit(mut self, limit: f32) -> Self {
        self.integral_limit = sanitize_limit(limit);
        self
    }

    pub fn with_output_limit(mut self, limit: f32) -> Self {
        self.output_limit = sanitize_limit(limit);
        self
    }

    /// Advances the controller by `dt` seconds. A non-positive `dt` contributes neither
    /// integral nor derivative.
    pub fn update(&mut self, target: f32, measured: f32, dt: f32) -> f32 {
        let error = target - measured;
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };

        self.integral =
            (self.integral + error * dt).clamp(-self.integral_limit, self.integral_limit);

        let derivative = if dt > 0.0 {
            (error - self.previous_error) / dt
        } else {
            0.0
        };
        self.previous_error = error;

        let output = self.kp * error + self.ki * self.integral + self.kd * derivative;
        output.clamp(-self.output_limit, self.output_limit)
    }

    /// Like [`Pid::update`], taking `dt` from the time elapsed since the previous call.
    /// The first call has a zero `dt`.
    pub fn update_at(&mut self, target: f32, measured: f32, now: Instant) -> f32 {
        let dt = self
            .last_update
            .map(|previous| now.saturating_duration_since(previous).as_secs_f32())
            .unwrap_or(0.0);
        self.last_update = Some(now);
        self.update(target, measured, dt)
    }

    pub fn update_now(&mut self, target: f32, measured: f32) -> f32 {
        self.update_at(target, measured, Instant::now())
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn previous_error(&self) -> f32 {
        self.previous_error
    }
}

fn sanitize_limit(limit: f32) -> f32 {
    if limit.is_nan() {
        f32::INFINITY
    } else {
        limit.abs()
    }
}
