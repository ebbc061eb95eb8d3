use api_types::identity::Mode;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Raw flag strings, as they come from the file or the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeatureSettings {
    pub enable_personal_mode: Option<String>,
    pub enable_business_mode: Option<String>,
    pub allow_mode_switching: Option<String>,
    pub default_mode: Option<String>,
    pub personal_budget: Option<String>,
    pub personal_goals: Option<String>,
    pub business_cash_flow_metrics: Option<String>,
    pub business_excel_export: Option<String>,
    pub business_ai_categorization: Option<String>,
    pub business_transaction_editing: Option<String>,
}

/// Individually switchable features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    PersonalMode,
    BusinessMode,
    ModeSwitching,
    PersonalBudget,
    PersonalGoals,
    BusinessCashFlowMetrics,
    BusinessExcelExport,
    BusinessAiCategorization,
    BusinessTransactionEditing,
}

impl Feature {
    pub const ALL: [Feature; 9] = [
        Feature::PersonalMode,
        Feature::BusinessMode,
        Feature::ModeSwitching,
        Feature::PersonalBudget,
        Feature::PersonalGoals,
        Feature::BusinessCashFlowMetrics,
        Feature::BusinessExcelExport,
        Feature::BusinessAiCategorization,
        Feature::BusinessTransactionEditing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PersonalMode => "personal_mode",
            Self::BusinessMode => "business_mode",
            Self::ModeSwitching => "mode_switching",
            Self::PersonalBudget => "personal_budget",
            Self::PersonalGoals => "personal_goals",
            Self::BusinessCashFlowMetrics => "business_cash_flow_metrics",
            Self::BusinessExcelExport => "business_excel_export",
            Self::BusinessAiCategorization => "business_ai_categorization",
            Self::BusinessTransactionEditing => "business_transaction_editing",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|feature| feature.as_str() == raw)
    }
}

/// Anything except the literal `"false"` enables a flag.
fn flag(value: &Option<String>, default: bool) -> bool {
    match value {
        None => default,
        Some(raw) => raw != "false",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFlags {
    personal: bool,
    business: bool,
    switching: bool,
    default_mode: Mode,
    personal_budget: bool,
    personal_goals: bool,
    business_cash_flow_metrics: bool,
    business_excel_export: bool,
    business_ai_categorization: bool,
    business_transaction_editing: bool,
}

impl FeatureFlags {
    pub fn resolve(settings: &FeatureSettings) -> Self {
        let mut personal = flag(&settings.enable_personal_mode, true);
        let business = flag(&settings.enable_business_mode, true);
        if !personal && !business {
            tracing::warn!("both modes disabled, falling back to personal mode");
            personal = true;
        }

        let available = |mode: Mode| match mode {
            Mode::Personal => personal,
            Mode::Business => business,
        };
        let requested = settings
            .default_mode
            .as_deref()
            .and_then(Mode::parse)
            .unwrap_or(Mode::Business);
        let default_mode = if available(requested) {
            requested
        } else if personal {
            Mode::Personal
        } else {
            Mode::Business
        };

        Self {
            personal,
            business,
            switching: flag(&settings.allow_mode_switching, true) && personal && business,
            default_mode,
            personal_budget: flag(&settings.personal_budget, true),
            personal_goals: flag(&settings.personal_goals, true),
            business_cash_flow_metrics: flag(&settings.business_cash_flow_metrics, true),
            business_excel_export: flag(&settings.business_excel_export, true),
            business_ai_categorization: flag(&settings.business_ai_categorization, true),
            business_transaction_editing: flag(&settings.business_transaction_editing, true),
        }
    }

    /// Sub-features are only on when the mode that owns them is on.
    pub fn is_feature_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::PersonalMode => self.personal,
            Feature::BusinessMode => self.business,
            Feature::ModeSwitching => self.switching,
            Feature::PersonalBudget => self.personal && self.personal_budget,
            Feature::PersonalGoals => self.personal && self.personal_goals,
            Feature::BusinessCashFlowMetrics => self.business && self.business_cash_flow_metrics,
            Feature::BusinessExcelExport => self.business && self.business_excel_export,
            Feature::BusinessAiCategorization => self.business && self.business_ai_categorization,
            Feature::BusinessTransactionEditing => {
                self.business && self.business_transaction_editing
            }
        }
    }

    /// `Err(FeatureDisabled)` unless `feature` is on.
    pub fn require(&self, feature: Feature) -> Result<()> {
        if self.is_feature_enabled(feature) {
            Ok(())
        } else {
            tracing::warn!("refusing {}: feature is disabled", feature.as_str());
            Err(Error::FeatureDisabled(feature))
        }
    }

    /// Name-based lookup; unknown names are disabled.
    pub fn is_enabled(&self, name: &str) -> bool {
        Feature::parse(name).is_some_and(|feature| self.is_feature_enabled(feature))
    }

    pub fn default_mode(&self) -> Mode {
        self.default_mode
    }

    pub fn can_switch_modes(&self) -> bool {
        self.switching
    }

    pub fn is_mode_available(&self, mode: Mode) -> bool {
        match mode {
            Mode::Personal => self.personal,
            Mode::Business => self.business,
        }
    }

    pub fn available_modes(&self) -> Vec<Mode> {
        Mode::ALL
            .into_iter()
            .filter(|mode| self.is_mode_available(*mode))
            .collect()
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::resolve(&FeatureSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn absent_flags_use_defaults() {
        let flags = FeatureFlags::default();
        assert!(flags.is_feature_enabled(Feature::PersonalMode));
        assert!(flags.is_feature_enabled(Feature::BusinessMode));
        assert!(flags.can_switch_modes());
        assert_eq!(flags.default_mode(), Mode::Business);
        assert_eq!(flags.available_modes(), vec![Mode::Personal, Mode::Business]);
    }

    #[test]
    fn only_literal_false_disables() {
        let flags = FeatureFlags::resolve(&FeatureSettings {
            personal_budget: s("false"),
            personal_goals: s("FALSE"),
            business_excel_export: s("0"),
            business_ai_categorization: s(""),
            ..Default::default()
        });
        assert!(!flags.is_feature_enabled(Feature::PersonalBudget));
        assert!(flags.is_feature_enabled(Feature::PersonalGoals));
        assert!(flags.is_feature_enabled(Feature::BusinessExcelExport));
        assert!(flags.is_feature_enabled(Feature::BusinessAiCategorization));
    }

    #[test]
    fn sub_features_follow_their_mode() {
        let flags = FeatureFlags::resolve(&FeatureSettings {
            enable_business_mode: s("false"),
            ..Default::default()
        });
        assert!(!flags.is_enabled("business_excel_export"));
        assert!(flags.is_enabled("personal-budget"));
        assert!(!flags.is_enabled("no_such_feature"));
    }

    #[test]
    fn require_reports_the_disabled_feature() {
        let flags = FeatureFlags::resolve(&FeatureSettings {
            business_transaction_editing: s("false"),
            ..Default::default()
        });
        assert!(flags.require(Feature::BusinessExcelExport).is_ok());
        assert!(matches!(
            flags.require(Feature::BusinessTransactionEditing),
            Err(Error::FeatureDisabled(Feature::BusinessTransactionEditing))
        ));
    }

    #[test]
    fn both_modes_disabled_keeps_personal() {
        let flags = FeatureFlags::resolve(&FeatureSettings {
            enable_personal_mode: s("false"),
            enable_business_mode: s("false"),
            ..Default::default()
        });
        assert_eq!(flags.available_modes(), vec![Mode::Personal]);
        assert_eq!(flags.default_mode(), Mode::Personal);
    }

    #[test]
    fn switching_needs_both_modes() {
        let flags = FeatureFlags::resolve(&FeatureSettings {
            enable_personal_mode: s("false"),
            allow_mode_switching: s("true"),
            default_mode: s("personal"),
            ..Default::default()
        });
        assert!(!flags.can_switch_modes());
        assert_eq!(flags.default_mode(), Mode::Business);
    }
}
