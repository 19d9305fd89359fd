use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vmwarden_core::AppError;

/// Managed disk storage tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DiskSku {
    /// Standard HDD, locally redundant.
    StandardLrs,
    /// Premium SSD, locally redundant.
    PremiumLrs,
    /// Standard SSD, locally redundant.
    #[default]
    StandardSsdLrs,
    /// Ultra SSD, locally redundant.
    UltraSsdLrs,
    /// Premium SSD, zone redundant.
    PremiumZrs,
    /// Standard SSD, zone redundant.
    StandardSsdZrs,
    /// Premium SSD v2, locally redundant.
    PremiumV2Lrs,
}

impl DiskSku {
    /// Returns the provider wire value for this SKU.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StandardLrs => "Standard_LRS",
            Self::PremiumLrs => "Premium_LRS",
            Self::StandardSsdLrs => "StandardSSD_LRS",
            Self::UltraSsdLrs => "UltraSSD_LRS",
            Self::PremiumZrs => "Premium_ZRS",
            Self::StandardSsdZrs => "StandardSSD_ZRS",
            Self::PremiumV2Lrs => "PremiumV2_LRS",
        }
    }

    /// Returns all known SKUs.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[DiskSku] = &[
            DiskSku::StandardLrs,
            DiskSku::PremiumLrs,
            DiskSku::StandardSsdLrs,
            DiskSku::UltraSsdLrs,
            DiskSku::PremiumZrs,
            DiskSku::StandardSsdZrs,
            DiskSku::PremiumV2Lrs,
        ];

        ALL
    }
}

impl FromStr for DiskSku {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|sku| sku.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| AppError::Validation(format!("unknown disk sku '{value}'")))
    }
}

impl TryFrom<String> for DiskSku {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<DiskSku> for String {
    fn from(value: DiskSku) -> Self {
        value.as_str().to_owned()
    }
}

impl Display for DiskSku {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}
