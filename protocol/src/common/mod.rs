//! Shared value types used across the protocol: checked monetary amounts
//! and wall-clock helpers.

pub mod amount;

pub use amount::Amount;

use chrono::{SecondsFormat, Utc};

/// Current wall-clock time as an RFC3339 string with microsecond precision.
///
/// This is the timestamp format carried inside ballots and blocks. It is
/// informational only — consensus never compares these values.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_rfc3339_parses_back() {
        let ts = now_rfc3339();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
