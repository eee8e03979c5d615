use std::str::FromStr;
use serde::Deserialize;

/// How a graph with several tail jobs resolves a task's final result.
///
/// - `All`: every tail must complete; the result maps tail name to output
///   (default). A single-tail graph reduces to that tail's output.
/// - `First`: the first tail to complete resolves the task. Tails already
///   running finish and their outputs are ignored; jobs that have not started
///   yet are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TailPolicy {
    All,
    First,
}

impl Default for TailPolicy {
    fn default() -> Self {
        TailPolicy::All
    }
}

impl FromStr for TailPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(TailPolicy::All),
            "first" => Ok(TailPolicy::First),
            other => Err(format!(
                "invalid tail_policy: {other} (expected \"all\" or \"first\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_names_case_insensitively() {
        assert_eq!("ALL".parse::<TailPolicy>(), Ok(TailPolicy::All));
        assert_eq!(" first ".parse::<TailPolicy>(), Ok(TailPolicy::First));
        assert!("any".parse::<TailPolicy>().is_err());
    }

    #[test]
    fn default_waits_for_every_tail() {
        assert_eq!(TailPolicy::default(), TailPolicy::All);
    }
}
