use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Interval like `1h15m30s`, `30m` or `45` (bare numbers are seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanDuration(pub Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut total: u64 = 0;
        let mut digits = String::new();
        let mut has_number = false;

        for c in s.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
                continue;
            }
            if c.is_whitespace() {
                continue;
            }
            let unit = match c {
                's' => 1,
                'm' => 60,
                'h' => 3600,
                'd' => 86400,
                _ => return Err(format!("Invalid duration unit: {}", c)),
            };
            let value: u64 = digits
                .parse()
                .map_err(|_| format!("Missing number before '{}'", c))?;
            total = add_seconds(total, value, unit)?;
            digits.clear();
            has_number = true;
        }

        if !digits.is_empty() {
            let value: u64 = digits.parse().map_err(|_| "Invalid number in duration".to_string())?;
            total = add_seconds(total, value, 1)?;
            has_number = true;
        }

        if !has_number {
            return Err("Duration must include a number".to_string());
        }
        if total == 0 {
            return Err("Duration must be positive".to_string());
        }
        Ok(HumanDuration(Duration::from_secs(total)))
    }
}

fn add_seconds(total: u64, value: u64, unit: u64) -> std::result::Result<u64, String> {
    value
        .checked_mul(unit)
        .and_then(|seconds| total.checked_add(seconds))
        .ok_or_else(|| "Duration is too long".to_string())
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
        if h > 0 {
            write!(f, "{}h", h)?;
        }
        if m > 0 {
            write!(f, "{}m", m)?;
        }
        if s > 0 || secs == 0 {
            write!(f, "{}s", s)?;
        }
        Ok(())
    }
}
