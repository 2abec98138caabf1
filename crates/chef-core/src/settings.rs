//! User settings consumed read-only by the core.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use chef_db::models::ParseEnumError;

/// Which window a generation run covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Today's breakfast, lunch and dinner. Triggered at 05:00.
    #[default]
    Morning,
    /// Tonight's dinner plus tomorrow's breakfast and lunch. Triggered at 17:00.
    Evening,
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Morning => "morning",
            Self::Evening => "evening",
        })
    }
}

impl FromStr for GenerationMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(Self::Morning),
            "evening" => Ok(Self::Evening),
            other => Err(ParseEnumError {
                kind: "generation mode",
                value: other.to_owned(),
            }),
        }
    }
}

/// How the consolidation call treats ingredients gathered from recipes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationMode {
    /// Near-duplicate names are unified and compatible quantities summed.
    Merge,
    /// Names are left alone; only a category is assigned.
    #[default]
    Categorize,
}

impl fmt::Display for ConsolidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Merge => "merge",
            Self::Categorize => "categorize",
        })
    }
}

impl FromStr for ConsolidationMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "categorize" => Ok(Self::Categorize),
            other => Err(ParseEnumError {
                kind: "consolidation mode",
                value: other.to_owned(),
            }),
        }
    }
}

/// Settings snapshot. Missing keys take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: GenerationMode,
    pub auto_fill: bool,
    pub servings: u8,
    pub expiry_warning_days: u32,
    pub show_expired_items: bool,
    pub auto_delete_matched: bool,
    pub consolidation: ConsolidationMode,
}

impl Settings {
    pub const MIN_SERVINGS: u8 = 1;
    pub const MAX_SERVINGS: u8 = 8;

    /// Serving count clamped to the supported range.
    pub fn servings(&self) -> u8 {
        self.servings.clamp(Self::MIN_SERVINGS, Self::MAX_SERVINGS)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: GenerationMode::Morning,
            auto_fill: true,
            servings: 2,
            expiry_warning_days: 7,
            show_expired_items: true,
            auto_delete_matched: true,
            consolidation: ConsolidationMode::Categorize,
        }
    }
}
