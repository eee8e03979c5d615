// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::model::{ConfigFile, EngineSettings, JobSpec, RawConfigFile};
use crate::dag::graph::topological_order;
use crate::errors::{JobGraphError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = JobGraphError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_jobs(&raw)?;
        let settings = validate_engine_section(&raw)?;
        validate_job_dependencies(&raw)?;
        validate_dag(&raw)?;

        let mut jobs = BTreeMap::new();
        for (name, job) in raw.job {
            let timeout = job
                .timeout
                .as_deref()
                .map(parse_duration)
                .transpose()
                .map_err(|e| {
                    JobGraphError::ConfigError(format!("job '{name}' has an invalid timeout: {e}"))
                })?;
            jobs.insert(
                name,
                JobSpec {
                    cmd: job.cmd,
                    after: job.after,
                    timeout,
                },
            );
        }

        Ok(ConfigFile::new_unchecked(settings, jobs))
    }
}

fn ensure_has_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(JobGraphError::ConfigError(
            "config must contain at least one [job.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_engine_section(cfg: &RawConfigFile) -> Result<EngineSettings> {
    let section = &cfg.config;

    if section.channel_capacity == 0 {
        return Err(JobGraphError::ConfigError(
            "[config].channel_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    if section.max_concurrent_jobs == Some(0) {
        return Err(JobGraphError::ConfigError(
            "[config].max_concurrent_jobs must be >= 1 (got 0)".to_string(),
        ));
    }

    let task_timeout = section
        .task_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()
        .map_err(|e| JobGraphError::ConfigError(format!("[config].task_timeout: {e}")))?;

    Ok(EngineSettings {
        tail_policy: section.tail_policy,
        task_timeout,
        max_concurrent_jobs: section.max_concurrent_jobs,
        channel_capacity: section.channel_capacity,
    })
}

fn validate_job_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, job) in cfg.job.iter() {
        if job.cmd.trim().is_empty() {
            return Err(JobGraphError::ConfigError(format!(
                "job '{}' has an empty `cmd`",
                name
            )));
        }
        for dep in job.after.iter() {
            if dep == name {
                return Err(JobGraphError::ConfigError(format!(
                    "job '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.job.contains_key(dep) {
                return Err(JobGraphError::ConfigError(format!(
                    "job '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> job. `[job.B] after = ["A"]` adds A -> B.
    let edges: Vec<(&str, &str)> = cfg
        .job
        .iter()
        .flat_map(|(name, job)| job.after.iter().map(move |dep| (dep.as_str(), name.as_str())))
        .collect();

    topological_order(cfg.job.keys().map(|k| k.as_str()), &edges)?;
    Ok(())
}

/// Parse durations like `"500ms"`, `"30s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_with_suffixes() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let err = parse_duration("307445734561825861m").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("18446744073709551615h").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Ok(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn oversized_task_timeout_is_a_config_error() {
        let raw: RawConfigFile = toml::from_str(
            r#"
[config]
task_timeout = "307445734561825861m"

[job.A]
cmd = "cat"
"#,
        )
        .unwrap();
        let err = ConfigFile::try_from(raw).unwrap_err();
        assert!(matches!(err, JobGraphError::ConfigError(ref msg) if msg.contains("too large")));
    }

    #[test]
    fn durations_without_valid_unit_are_rejected() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("5d").unwrap_err().contains("unsupported duration unit"));
    }

    #[test]
    fn raw_config_converts_durations() {
        let raw: RawConfigFile = toml::from_str(
            r#"
            [config]
            task_timeout = "2s"

            [job.A]
            cmd = "cat"
            timeout = "150ms"
            "#,
        )
        .unwrap();

        let cfg = ConfigFile::try_from(raw).unwrap();
        assert_eq!(cfg.settings().task_timeout, Some(Duration::from_secs(2)));
        assert_eq!(
            cfg.job("A").and_then(|j| j.timeout),
            Some(Duration::from_millis(150))
        );
        assert_eq!(cfg.settings().channel_capacity, 64);
    }
}
