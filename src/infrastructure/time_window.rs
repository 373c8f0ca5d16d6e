// Wire encoding of query window bounds
use chrono::{DateTime, SecondsFormat, Utc};

/// Wire format for window bounds, e.g. `2025-07-19T22:00:00.000Z`
pub fn to_wire(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_wire() {
        let dt = DateTime::parse_from_rfc3339("2025-07-19T22:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(to_wire(&dt), "2025-07-19T22:00:00.000Z");
    }

    #[test]
    fn test_to_wire_keeps_milliseconds() {
        let dt = DateTime::parse_from_rfc3339("2025-07-19T22:00:00.25+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(to_wire(&dt), "2025-07-19T20:00:00.250Z");
    }
}
