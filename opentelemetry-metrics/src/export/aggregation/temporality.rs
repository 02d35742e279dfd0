use std::str::FromStr;

use crate::error::MetricsError;

/// Temporality decides what a checkpoint does with the state it snapshots.
///
/// `LastValue` aggregators never reset and `Exact` aggregators always drain,
/// regardless of temporality.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum Temporality {
    /// Aggregates accumulate from the first update for the life of the
    /// process.
    #[default]
    Cumulative,

    /// Aggregates reset after every checkpoint, so each collection reports
    /// only what was recorded since the previous one.
    Delta,
}

impl Temporality {
    /// Whether checkpoints reset the aggregator they copy from.
    pub fn resets(&self) -> bool {
        matches!(self, Temporality::Delta)
    }
}

impl FromStr for Temporality {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cumulative" => Ok(Temporality::Cumulative),
            "delta" => Ok(Temporality::Delta),
            other => Err(MetricsError::Config(format!(
                "unknown temporality {other:?}, expected \"cumulative\" or \"delta\""
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Delta".parse::<Temporality>().unwrap(), Temporality::Delta);
        assert_eq!(
            " CUMULATIVE ".parse::<Temporality>().unwrap(),
            Temporality::Cumulative
        );
        assert!("rolling".parse::<Temporality>().is_err());
    }
}
