//! Operating modes and the label resolver

use crate::config::ModeLabelsConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Charge mode chosen by the user through the external selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    #[default]
    Off,
    MaxCharge,
    MinCharge,
    ProtectBattery,
    PvPreferBattery,
    PvPreferCharge,
}

impl OperatingMode {
    pub const ALL: [OperatingMode; 6] = [
        OperatingMode::Off,
        OperatingMode::MaxCharge,
        OperatingMode::MinCharge,
        OperatingMode::ProtectBattery,
        OperatingMode::PvPreferBattery,
        OperatingMode::PvPreferCharge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperatingMode::Off => "off",
            OperatingMode::MaxCharge => "max_charge",
            OperatingMode::MinCharge => "min_charge",
            OperatingMode::ProtectBattery => "protect_battery",
            OperatingMode::PvPreferBattery => "pv_prefer_battery",
            OperatingMode::PvPreferCharge => "pv_prefer_charge",
        }
    }

    /// Modes handled by the PV-adaptive regulator
    pub fn is_pv(self) -> bool {
        matches!(
            self,
            OperatingMode::PvPreferBattery | OperatingMode::PvPreferCharge
        )
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps selector labels to modes. Anything unknown resolves to `Off`.
#[derive(Debug, Clone)]
pub struct ModeResolver {
    by_label: HashMap<String, OperatingMode>,
    labels: ModeLabelsConfig,
}

impl Default for ModeResolver {
    fn default() -> Self {
        Self::new(&ModeLabelsConfig::default())
    }
}

impl ModeResolver {
    pub fn new(labels: &ModeLabelsConfig) -> Self {
        let by_label = OperatingMode::ALL
            .iter()
            .map(|mode| (label_of(labels, *mode).to_string(), *mode))
            .collect();
        Self {
            by_label,
            labels: labels.clone(),
        }
    }

    pub fn resolve(&self, label: &str) -> OperatingMode {
        self.by_label.get(label).copied().unwrap_or_default()
    }

    /// Whether the label is one of the configured six
    pub fn is_known(&self, label: &str) -> bool {
        self.by_label.contains_key(label)
    }

    /// Selector label for a mode, used when switching modes remotely
    pub fn label_for(&self, mode: OperatingMode) -> &str {
        label_of(&self.labels, mode)
    }
}

fn label_of(labels: &ModeLabelsConfig, mode: OperatingMode) -> &str {
    match mode {
        OperatingMode::Off => &labels.off,
        OperatingMode::MaxCharge => &labels.max_charge,
        OperatingMode::MinCharge => &labels.min_charge,
        OperatingMode::ProtectBattery => &labels.protect_battery,
        OperatingMode::PvPreferBattery => &labels.pv_prefer_battery,
        OperatingMode::PvPreferCharge => &labels.pv_prefer_charge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_map_one_to_one() {
        let resolver = ModeResolver::default();
        assert_eq!(resolver.resolve("Aus"), OperatingMode::Off);
        assert_eq!(resolver.resolve("Max Charge"), OperatingMode::MaxCharge);
        assert_eq!(resolver.resolve("Min Charge"), OperatingMode::MinCharge);
        assert_eq!(
            resolver.resolve("Protect Battery"),
            OperatingMode::ProtectBattery
        );
        assert_eq!(
            resolver.resolve("PV Charge (Prefer Battery)"),
            OperatingMode::PvPreferBattery
        );
        assert_eq!(
            resolver.resolve("PV Charge (Prefer Charge)"),
            OperatingMode::PvPreferCharge
        );
    }

    #[test]
    fn unknown_labels_fall_back_to_off() {
        let resolver = ModeResolver::default();
        assert_eq!(resolver.resolve("Unrecognized Text"), OperatingMode::Off);
        assert_eq!(resolver.resolve(""), OperatingMode::Off);
        assert!(!resolver.is_known("max charge"));
    }

    #[test]
    fn label_lookup_round_trips() {
        let resolver = ModeResolver::default();
        for mode in OperatingMode::ALL {
            assert_eq!(resolver.resolve(resolver.label_for(mode)), mode);
        }
    }

    #[test]
    fn custom_labels() {
        let labels = ModeLabelsConfig {
            max_charge: "Fast".to_string(),
            ..ModeLabelsConfig::default()
        };
        let resolver = ModeResolver::new(&labels);
        assert_eq!(resolver.resolve("Fast"), OperatingMode::MaxCharge);
        assert_eq!(resolver.resolve("Max Charge"), OperatingMode::Off);
    }
}
