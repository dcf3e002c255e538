use std::str::FromStr;

use crate::engine::validate_slot_minutes;
use crate::model::Minutes;

/// How the last slot of a window is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotBoundary {
    /// Emit every start strictly before the window end, even if the slot
    /// runs past it. Matches the behaviour clinics already rely on.
    #[default]
    Permissive,
    /// Emit only slots that finish at or before the window end.
    Strict,
}

impl FromStr for SlotBoundary {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(SlotBoundary::Permissive),
            "strict" => Ok(SlotBoundary::Strict),
            other => Err(format!("unknown slot boundary {other:?}")),
        }
    }
}

/// What a room or provider link coming back to `active` does to its
/// inactive assignments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReactivationPolicy {
    /// Every referencing assignment becomes active again, including ones
    /// that were switched off by hand before the outage.
    #[default]
    RestoreAll,
    /// Only assignments the cascade itself suspended come back, and only
    /// once nothing else holds them.
    RestoreCascaded,
}

impl FromStr for ReactivationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "restore_all" | "all" => Ok(ReactivationPolicy::RestoreAll),
            "restore_cascaded" | "cascaded" => Ok(ReactivationPolicy::RestoreCascaded),
            other => Err(format!("unknown reactivation policy {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Slot length when neither the assignment nor a price schedule sets one.
    pub default_slot_minutes: Minutes,
    pub slot_boundary: SlotBoundary,
    pub reactivation: ReactivationPolicy,
    /// Prometheus listener port; metrics are not exported when unset.
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_slot_minutes: 30,
            slot_boundary: SlotBoundary::default(),
            reactivation: ReactivationPolicy::default(),
            metrics_port: None,
        }
    }
}

impl EngineConfig {
    /// Read `AGENDA_*` variables from the process environment. Unset or
    /// unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let default_slot_minutes = lookup("AGENDA_DEFAULT_SLOT_MINUTES")
            .and_then(|s| s.parse().ok())
            .filter(|m: &Minutes| validate_slot_minutes(*m).is_ok())
            .unwrap_or(defaults.default_slot_minutes);
        let slot_boundary = lookup("AGENDA_SLOT_BOUNDARY")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.slot_boundary);
        let reactivation = lookup("AGENDA_REACTIVATION")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.reactivation);
        let metrics_port = lookup("AGENDA_METRICS_PORT").and_then(|s| s.parse().ok());

        Self {
            default_slot_minutes,
            slot_boundary,
            reactivation,
            metrics_port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = EngineConfig::from_lookup(|_| None);
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.default_slot_minutes, 30);
        assert_eq!(cfg.slot_boundary, SlotBoundary::Permissive);
        assert_eq!(cfg.reactivation, ReactivationPolicy::RestoreAll);
        assert_eq!(cfg.metrics_port, None);
    }

    #[test]
    fn reads_all_keys() {
        let cfg = EngineConfig::from_lookup(lookup_from(&[
            ("AGENDA_DEFAULT_SLOT_MINUTES", "20"),
            ("AGENDA_SLOT_BOUNDARY", "Strict"),
            ("AGENDA_REACTIVATION", "restore_cascaded"),
            ("AGENDA_METRICS_PORT", "9100"),
        ]));
        assert_eq!(cfg.default_slot_minutes, 20);
        assert_eq!(cfg.slot_boundary, SlotBoundary::Strict);
        assert_eq!(cfg.reactivation, ReactivationPolicy::RestoreCascaded);
        assert_eq!(cfg.metrics_port, Some(9100));
    }

    #[test]
    fn garbage_falls_back() {
        let cfg = EngineConfig::from_lookup(lookup_from(&[
            ("AGENDA_DEFAULT_SLOT_MINUTES", "-5"),
            ("AGENDA_SLOT_BOUNDARY", "sometimes"),
            ("AGENDA_REACTIVATION", ""),
            ("AGENDA_METRICS_PORT", "http"),
        ]));
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn slot_minutes_out_of_range_falls_back() {
        let cfg = EngineConfig::from_lookup(lookup_from(&[("AGENDA_DEFAULT_SLOT_MINUTES", "2000")]));
        assert_eq!(cfg.default_slot_minutes, 30);

        let cfg = EngineConfig::from_lookup(lookup_from(&[("AGENDA_DEFAULT_SLOT_MINUTES", "1440")]));
        assert_eq!(cfg.default_slot_minutes, 1440);
    }
}
