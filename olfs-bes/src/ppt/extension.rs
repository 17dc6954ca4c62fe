//! Extension chunk records
//!
//! An extension chunk carries `name=value;` pairs. Only `status` is
//! interpreted; everything else is kept so callers can log it.

use std::fmt;

/// Extension name carrying the message status
pub const STATUS: &str = "status";

/// `status` value latching the error state for the rest of a message
pub const ERROR_STATUS: &str = "error";

/// `status` value asking the client to drop the connection immediately
pub const EMERGENCY_EXIT_STATUS: &str = "exit";

/// `status` value announcing the peer closes after the current message
pub const EXIT_STATUS: &str = crate::ppt::handshake::EXIT_NOW;

/// Interpretation of a `status=` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Error,
    EmergencyExit,
    Exit,
    /// Advisory value, logged and ignored
    Other(String),
}

impl Status {
    fn from_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case(ERROR_STATUS) {
            Status::Error
        } else if value.eq_ignore_ascii_case(EMERGENCY_EXIT_STATUS) {
            Status::EmergencyExit
        } else if value.eq_ignore_ascii_case(EXIT_STATUS) {
            Status::Exit
        } else {
            Status::Other(value.to_string())
        }
    }

    fn as_value(&self) -> &str {
        match self {
            Status::Error => ERROR_STATUS,
            Status::EmergencyExit => EMERGENCY_EXIT_STATUS,
            Status::Exit => EXIT_STATUS,
            Status::Other(v) => v,
        }
    }
}

/// Parsed contents of one extension chunk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionRecord {
    pairs: Vec<(String, String)>,
}

impl ExtensionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record holding a single `status=<value>` pair
    pub fn status(status: Status) -> Self {
        Self::new().with(STATUS, status.as_value())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((name.into(), value.into()));
        self
    }

    /// Parse a payload such as `status=error;count=3;`.
    ///
    /// Empty segments are skipped; a segment without `=` becomes a name
    /// with an empty value.
    pub fn parse(payload: &str) -> Self {
        let pairs = payload
            .split(';')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.split_once('=') {
                Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
                None => (segment.to_string(), String::new()),
            })
            .collect();
        Self { pairs }
    }

    /// Serialise as `;`-terminated pairs.
    pub fn to_payload(&self) -> String {
        self.pairs
            .iter()
            .map(|(name, value)| format!("{}={};", name, value))
            .collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Every `status` value in the record, in order.
    pub fn statuses(&self) -> impl Iterator<Item = Status> + '_ {
        self.pairs
            .iter()
            .filter(|(name, _)| name == STATUS)
            .map(|(_, value)| Status::from_value(value))
    }

    /// Pairs other than `status`
    pub fn unrecognized(&self) -> impl Iterator<Item = &(String, String)> {
        self.pairs.iter().filter(|(name, _)| name != STATUS)
    }
}

impl fmt::Display for ExtensionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_error() {
        let record = ExtensionRecord::parse("status=error;");
        let statuses: Vec<Status> = record.statuses().collect();
        assert_eq!(statuses, vec![Status::Error]);
    }

    #[test]
    fn test_parse_mixed_pairs() {
        let record = ExtensionRecord::parse("count=12;status=EXIT;flavor=vanilla");
        assert_eq!(record.pairs().len(), 3);
        assert_eq!(record.statuses().collect::<Vec<_>>(), vec![Status::EmergencyExit]);

        let others: Vec<&str> = record.unrecognized().map(|(n, _)| n.as_str()).collect();
        assert_eq!(others, vec!["count", "flavor"]);
    }

    #[test]
    fn test_parse_exit_now_and_advisory() {
        let record = ExtensionRecord::parse("status=<exit-now>;status=busy;");
        let statuses: Vec<Status> = record.statuses().collect();
        assert_eq!(
            statuses,
            vec![Status::Exit, Status::Other("busy".to_string())]
        );
    }

    #[test]
    fn test_parse_tolerates_noise() {
        let record = ExtensionRecord::parse(";; bare ; status = error ;");
        assert_eq!(
            record.pairs(),
            &[
                ("bare".to_string(), String::new()),
                ("status".to_string(), "error".to_string())
            ]
        );
    }

    #[test]
    fn test_to_payload() {
        assert_eq!(ExtensionRecord::status(Status::Error).to_payload(), "status=error;");
        let record = ExtensionRecord::new().with("count", "2").with("status", "error");
        assert_eq!(record.to_string(), "count=2;status=error;");
        assert_eq!(ExtensionRecord::parse(&record.to_payload()), record);
    }
}
