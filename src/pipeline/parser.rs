use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use crate::types::{Reading, SkipReason};
/// Field separator emitted by the sensor firmware.
pub const DEFAULT_DELIMITER: &str = ", ";
/// Cheap pre-parse check deciding whether a line is worth splitting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidacyRule {
    /// First character must be an ASCII digit. Negative readings are dropped;
    /// this matches the logs already recorded by the firmware tooling.
    #[default]
    LeadingDigit,
    /// Also accept a leading sign or decimal point.
    Signed,
}
impl CandidacyRule {
    fn accepts(self, first: char) -> bool {
        match self {
            CandidacyRule::LeadingDigit => first.is_ascii_digit(),
            CandidacyRule::Signed => first.is_ascii_digit() || matches!(first, '-' | '+' | '.'),
        }
    }
}
/// Turns decoded lines into fixed-arity readings.
#[derive(Clone, Debug)]
pub struct ReadingParser {
    channel_count: usize,
    delimiter: String,
    rule: CandidacyRule,
}
impl ReadingParser {
    pub fn new(channel_count: usize, delimiter: impl Into<String>, rule: CandidacyRule) -> Self {
        Self {
            channel_count,
            delimiter: delimiter.into(),
            rule,
        }
    }
    pub fn is_candidate(&self, line: &str) -> bool {
        line.chars().next().is_some_and(|c| self.rule.accepts(c))
    }
    /// Parses `line` into a reading stamped with the current wall-clock time.
    pub fn parse(&self, line: &str) -> Result<Reading, SkipReason> {
        self.parse_at(line, Local::now())
    }
    pub fn parse_at(&self, line: &str, timestamp: DateTime<Local>) -> Result<Reading, SkipReason> {
        let channels = self.parse_fields(line)?;
        Ok(Reading::new(timestamp, channels))
    }
    /// Validates and splits `line` without stamping it.
    pub fn parse_fields(&self, line: &str) -> Result<Vec<f64>, SkipReason> {
        if line.is_empty() {
            return Err(SkipReason::Empty);
        }
        if !self.is_candidate(line) {
            return Err(SkipReason::NotCandidate);
        }
        let fields: Vec<&str> = line.split(self.delimiter.as_str()).collect();
        if fields.len() != self.channel_count {
            return Err(SkipReason::FieldCount {
                expected: self.channel_count,
                actual: fields.len(),
            });
        }
        fields
            .iter()
            .enumerate()
            .map(|(index, field)| parse_value(field).ok_or(SkipReason::InvalidNumber { index }))
            .collect()
    }
}
/// Parses one channel value. Non-finite values are refused because they
/// would poison the display bounds.
pub fn parse_value(field: &str) -> Option<f64> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
