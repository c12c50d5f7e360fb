use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// Report timestamp, always UTC, serialized as RFC3339 with a `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Parse an RFC3339 string; offsets other than `Z`/`+00:00` are rejected.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let rejected = || ValidationError::TimestampNotUtc {
            value: input.to_owned(),
        };
        OffsetDateTime::parse(input, &Rfc3339)
            .ok()
            .filter(|parsed| parsed.offset() == UtcOffset::UTC)
            .map(Self)
            .ok_or_else(rejected)
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn format_rfc3339(self) -> String {
        // Only years outside 0..=9999 fail to format.
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl TryFrom<String> for UtcDateTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UtcDateTime> for String {
    fn from(value: UtcDateTime) -> Self {
        value.format_rfc3339()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let stamp = UtcDateTime::parse("2024-03-01T12:30:00Z").expect("must parse");

        let json = serde_json::to_string(&stamp).expect("serialize");

        assert_eq!(json, "\"2024-03-01T12:30:00Z\"");
        assert_eq!(serde_json::from_str::<UtcDateTime>(&json).expect("deserialize"), stamp);
        assert_eq!(stamp.year(), 2024);
    }

    #[test]
    fn offset_timestamps_are_rejected() {
        let err = UtcDateTime::parse("2024-01-01T01:00:00+01:00").expect_err("must fail");
        assert!(matches!(err, ValidationError::TimestampNotUtc { .. }));
        assert!(serde_json::from_str::<UtcDateTime>("\"yesterday\"").is_err());
    }
}
