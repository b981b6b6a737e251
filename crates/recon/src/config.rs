use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::error::ReconError;
use crate::extract::BankAccountMapping;
use crate::grid::Layout;
use crate::model::MatchKind;

/// Most short codes any one account is known by.
const MAX_SHORT_CODES: usize = 4;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    /// Ledger workbooks, relative to the config file's directory.
    #[serde(default)]
    pub file1: Option<String>,
    #[serde(default)]
    pub file2: Option<String>,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub stages: StageConfig,
    #[serde(default)]
    pub narration: NarrationConfig,
    /// Full bank-account name → short codes used in counterpart narrations.
    #[serde(default)]
    pub bank_accounts: BTreeMap<String, Vec<String>>,
    /// Treat unmatched blocks as a failing run (CLI exit code).
    #[serde(default)]
    pub fail_on_unmatched: bool,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: "interunit".into(),
            file1: None,
            file2: None,
            layout: LayoutConfig::default(),
            stages: StageConfig::default(),
            narration: NarrationConfig::default(),
            bank_accounts: BTreeMap::new(),
            fail_on_unmatched: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_data_start_row")]
    pub data_start_row: usize,
    /// Worksheet name. First sheet when absent.
    #[serde(default)]
    pub sheet: Option<String>,
}

fn default_data_start_row() -> usize {
    Layout::default().data_start_row
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self { data_start_row: default_data_start_row(), sheet: None }
    }
}

impl LayoutConfig {
    pub fn layout(&self) -> Layout {
        Layout { data_start_row: self.data_start_row }
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Enabled stages. Listing order is irrelevant: stages always run in
/// priority order.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    #[serde(default = "all_stages")]
    pub enabled: Vec<MatchKind>,
}

fn all_stages() -> Vec<MatchKind> {
    MatchKind::PRIORITY.to_vec()
}

impl Default for StageConfig {
    fn default() -> Self {
        Self { enabled: all_stages() }
    }
}

impl StageConfig {
    pub fn is_enabled(&self, kind: MatchKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Enabled stages in priority order.
    pub fn ordered(&self) -> Vec<MatchKind> {
        MatchKind::PRIORITY
            .into_iter()
            .filter(|k| self.is_enabled(*k))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Narration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NarrationConfig {
    /// Shortest voucher number the cross-reference stage will search for.
    /// Any non-empty voucher by default; raise it to skip short numbers.
    #[serde(default = "default_min_voucher_len")]
    pub min_voucher_len: usize,
}

fn default_min_voucher_len() -> usize {
    1
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self { min_voucher_len: default_min_voucher_len() }
    }
}

// ---------------------------------------------------------------------------
// Parse + validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    /// Parse a TOML config string.
    pub fn from_toml(s: &str) -> Result<Self, ReconError> {
        let config: ReconConfig = toml::from_str(s).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ReconError> {
        if self.layout.data_start_row == 0 {
            return Err(ReconError::ConfigValidation(
                "layout.data_start_row is 1-based and must be at least 1".into(),
            ));
        }
        if self.narration.min_voucher_len == 0 {
            return Err(ReconError::ConfigValidation(
                "narration.min_voucher_len must be at least 1".into(),
            ));
        }
        if self.stages.enabled.is_empty() {
            return Err(ReconError::ConfigValidation("stages.enabled lists no stages".into()));
        }

        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (account, codes) in &self.bank_accounts {
            if account.trim().is_empty() {
                return Err(ReconError::ConfigValidation("bank account name is empty".into()));
            }
            if codes.is_empty() || codes.len() > MAX_SHORT_CODES {
                return Err(ReconError::ConfigValidation(format!(
                    "bank account '{account}': expected 1 to {MAX_SHORT_CODES} short codes, found {}",
                    codes.len()
                )));
            }
            for code in codes {
                if code.trim().is_empty() {
                    return Err(ReconError::ConfigValidation(format!(
                        "bank account '{account}': empty short code"
                    )));
                }
                if let Some(other) = owners.insert(code.as_str(), account.as_str()) {
                    if other != account.as_str() {
                        return Err(ReconError::ConfigValidation(format!(
                            "short code '{code}' is listed under both '{other}' and '{account}'"
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn bank_mapping(&self) -> BankAccountMapping {
        BankAccountMapping::new(
            self.bank_accounts
                .iter()
                .map(|(account, codes)| (account.clone(), codes.clone())),
        )
    }
}
