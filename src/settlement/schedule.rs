//! Schedule expressions for the settlement scheduler.
//!
//! Accepted forms:
//! - five-field cron with a minute step: `*/5 * * * *`
//! - `@every 90s`, `@every 5m`, `@every 1h`
//! - a bare duration: `300s`, `5m`, `1h`

use chrono::{DateTime, Timelike, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fire on wall-clock minutes divisible by the step
    EveryMinutes(u32),
    /// Fire on a fixed interval measured from the previous tick
    Interval(Duration),
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self, String> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err("empty schedule expression".to_string());
        }

        if let Some(rest) = expr.strip_prefix("@every") {
            return parse_duration(rest.trim()).map(Schedule::Interval);
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() == 5 {
            if fields[1..].iter().any(|f| *f != "*") {
                return Err(format!(
                    "unsupported cron expression '{}': only minute steps are supported",
                    expr
                ));
            }
            let step = match fields[0] {
                "*" => 1,
                minute => minute
                    .strip_prefix("*/")
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(|| format!("unsupported minute field '{}'", minute))?,
            };
            if step == 0 || step > 60 || 60 % step != 0 {
                return Err(format!("minute step must divide 60, got {}", step));
            }
            return Ok(Schedule::EveryMinutes(step));
        }

        parse_duration(expr).map(Schedule::Interval)
    }

    /// Delay from `now` until the next tick
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Schedule::Interval(d) => *d,
            Schedule::EveryMinutes(step) => {
                let step_secs = u64::from(*step) * 60;
                let into_hour = u64::from(now.minute()) * 60 + u64::from(now.second());
                let elapsed_in_step = into_hour % step_secs;
                let remaining = step_secs - elapsed_in_step;
                Duration::from_secs(remaining)
                    .saturating_sub(Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000)))
                    .max(Duration::from_millis(1))
            }
        }
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::EveryMinutes(1) => write!(f, "* * * * *"),
            Schedule::EveryMinutes(step) => write!(f, "*/{} * * * *", step),
            Schedule::Interval(d) => write!(f, "@every {}s", d.as_secs()),
        }
    }
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in duration '{}'", raw))?;
    let (value, unit) = raw.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("invalid duration '{}'", raw))?;
    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(format!("unknown duration unit '{}'", unit)),
    };
    let secs = value
        .checked_mul(scale)
        .ok_or_else(|| format!("duration '{}' is too large", raw))?;
    if secs == 0 {
        return Err("schedule interval must be positive".to_string());
    }
    Ok(Duration::from_secs(secs))
}
