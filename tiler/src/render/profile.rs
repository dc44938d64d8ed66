//! Normalization profiles and the layer-name lookup that selects them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category governing how a layer's band values are stretched and colored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationProfile {
    Vegetation,
    Moisture,
    Soil,
    Default,
}

/// Transfer function of a profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transfer {
    /// Clip to a fixed range, then rescale it to 0..=255
    Clip { min: f64, max: f64 },
    /// Clip to the given percentiles of the window's valid samples
    Percentile { low: f64, high: f64 },
}

impl NormalizationProfile {
    pub const ALL: [NormalizationProfile; 4] = [
        NormalizationProfile::Vegetation,
        NormalizationProfile::Moisture,
        NormalizationProfile::Soil,
        NormalizationProfile::Default,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            NormalizationProfile::Vegetation => "vegetation",
            NormalizationProfile::Moisture => "moisture",
            NormalizationProfile::Soil => "soil",
            NormalizationProfile::Default => "default",
        }
    }

    pub fn transfer(&self) -> Transfer {
        match self {
            NormalizationProfile::Vegetation => Transfer::Clip {
                min: -0.2,
                max: 1.0,
            },
            NormalizationProfile::Moisture => Transfer::Clip { min: 0.0, max: 1.0 },
            NormalizationProfile::Soil => Transfer::Clip {
                min: -6.0,
                max: 5.0,
            },
            NormalizationProfile::Default => Transfer::Percentile {
                low: 2.0,
                high: 98.0,
            },
        }
    }
}

impl fmt::Display for NormalizationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NormalizationProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vegetation" => Ok(NormalizationProfile::Vegetation),
            "moisture" => Ok(NormalizationProfile::Moisture),
            "soil" => Ok(NormalizationProfile::Soil),
            "default" => Ok(NormalizationProfile::Default),
            other => Err(format!(
                "unknown profile '{}' (expected vegetation, moisture, soil or default)",
                other
            )),
        }
    }
}

/// Ordered keyword table mapping layer names to profiles
///
/// Keywords match case-insensitively anywhere in the layer name; the first
/// matching rule wins and unmatched names get [`NormalizationProfile::Default`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRules {
    rules: Vec<(String, NormalizationProfile)>,
}

impl ProfileRules {
    /// Empty table: every layer resolves to the default profile
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Keywords of the spectral-index layers the tiler ships with
    pub fn builtin() -> Self {
        use NormalizationProfile::*;
        let mut rules = Self::empty();
        for (keyword, profile) in [
            ("NDVI", Vegetation),
            ("EVI", Vegetation),
            ("SAVI", Vegetation),
            ("AGRICULTURE", Vegetation),
            ("MOISTURE", Moisture),
            ("SOIL", Soil),
        ] {
            rules.push(keyword, profile);
        }
        rules
    }

    /// Append a rule after the existing ones
    pub fn push(&mut self, keyword: &str, profile: NormalizationProfile) {
        self.rules.push((keyword.trim().to_uppercase(), profile));
    }

    /// Rules of `overrides` take precedence over these
    pub fn with_overrides(self, overrides: ProfileRules) -> Self {
        let mut rules = overrides.rules;
        rules.extend(self.rules);
        Self { rules }
    }

    pub fn resolve(&self, layer_name: &str) -> NormalizationProfile {
        let name = layer_name.to_uppercase();
        self.rules
            .iter()
            .find(|(keyword, _)| name.contains(keyword.as_str()))
            .map(|(_, profile)| *profile)
            .unwrap_or(NormalizationProfile::Default)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for ProfileRules {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FromStr for ProfileRules {
    type Err = String;

    /// Parses `keyword=profile` pairs separated by commas
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rules = Self::empty();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (keyword, profile) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected 'keyword=profile', got '{}'", pair))?;
            if keyword.trim().is_empty() {
                return Err(format!("empty keyword in '{}'", pair));
            }
            rules.push(keyword, profile.parse()?);
        }
        Ok(rules)
    }
}
