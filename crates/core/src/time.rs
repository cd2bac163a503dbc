use std::time::Duration;

use chrono::Utc;

use crate::error::{ProberError, Result};

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| ProberError::Parse(format!("invalid duration {input}: {e}")))
}

pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration() {
        assert_eq!(parse_duration_str("5m").unwrap(), Duration::from_secs(300));
        assert!(parse_duration_str("nope").is_err());
    }
}
