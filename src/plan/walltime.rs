use std::fmt;
use std::time::Duration;

#[derive(Debug, PartialEq, Eq)]
pub struct WalltimeError {
    pub input: String,
}

impl fmt::Display for WalltimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "invalid wall time {:?}, expected HH:MM:SS or D-HH:MM:SS", self.input)
    }
}

impl std::error::Error for WalltimeError {}

/// Parse a SLURM wall time (`HH:MM:SS`, optionally prefixed with `D-`)
///
/// Hours aren't capped at 23 when there's no day prefix, so `48:00:00` is two days.
pub fn parse_walltime(input: &str) -> Result<Duration, WalltimeError> {
    let err = || WalltimeError { input: input.to_string() };

    let (days, clock) = match input.split_once('-') {
        Some((days, clock)) => (parse_field(days).ok_or_else(err)?, clock),
        None => (0, input),
    };

    let fields: Vec<&str> = clock.split(':').collect();
    let [hours, minutes, seconds] = fields.as_slice() else {
        return Err(err());
    };
    let hours = parse_field(hours).ok_or_else(err)?;
    let minutes = parse_field(minutes).filter(|m| *m < 60).ok_or_else(err)?;
    let seconds = parse_field(seconds).filter(|s| *s < 60).ok_or_else(err)?;

    let total = days.checked_mul(86_400)
        .and_then(|secs| secs.checked_add(hours.checked_mul(3_600)?))
        .and_then(|secs| secs.checked_add(minutes * 60 + seconds))
        .ok_or_else(err)?;
    Ok(Duration::from_secs(total))
}

/// Format a duration as `HH:MM:SS`, dropping sub-second precision
pub fn format_walltime(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3_600, (secs % 3_600) / 60, secs % 60)
}

fn parse_field(field: &str) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hours_beyond_a_day() {
        assert_eq!(parse_walltime("48:00:00").unwrap(), Duration::from_secs(48 * 3_600));
        assert_eq!(parse_walltime("03:00:00").unwrap(), Duration::from_secs(3 * 3_600));
    }

    #[test]
    fn parses_day_prefix() {
        assert_eq!(parse_walltime("2-00:30:05").unwrap(), Duration::from_secs(2 * 86_400 + 30 * 60 + 5));
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "48", "48:00", "1:60:00", "00:00:99", "x-01:00:00", "-1:00:00", "01:00:00:00",
            "9999999999999999999:00:00", "99999999999999999999:00:00", "999999999999999-00:00:00"] {
            assert!(parse_walltime(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn formats_back() {
        assert_eq!(format_walltime(Duration::from_secs(51 * 3_600 + 61)), "51:01:01");
    }
}
