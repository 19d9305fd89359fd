use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vmwarden_core::{AppError, AppResult, ResourceGroupName};

/// Snapshot of one compute instance as reported by the provider.
///
/// Fetched on demand and never cached beyond a single operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineRef {
    /// Opaque provider resource identifier.
    pub id: String,
    /// Display name, unique within the resource group.
    pub name: String,
    /// Region code the instance lives in.
    pub location: String,
    /// Owning resource group.
    pub resource_group: ResourceGroupName,
    /// Hardware size, when reported.
    pub vm_size: Option<String>,
    /// Name of the attached OS disk, when reported.
    pub os_disk_name: Option<String>,
    /// Size of the OS disk in GiB, when reported.
    pub os_disk_size_gb: Option<u32>,
    /// Resource tags.
    pub tags: BTreeMap<String, String>,
}

impl VirtualMachineRef {
    /// Returns the OS disk name, treating an empty name as absent.
    #[must_use]
    pub fn os_disk_name(&self) -> Option<&str> {
        self.os_disk_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Returns whether the instance carries the given tag.
    #[must_use]
    pub fn has_tag(&self, filter: &TagFilter) -> bool {
        filter.matches(&self.tags)
    }
}

/// Resource group snapshot returned by a group scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroupRef {
    /// Group name.
    pub name: ResourceGroupName,
    /// Group region.
    pub location: String,
    /// Group tags.
    pub tags: BTreeMap<String, String>,
}

/// Tag equality filter (`name = value`).
///
/// Tag names compare case-insensitively like the provider does; values compare exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    name: String,
    value: String,
}

impl TagFilter {
    /// Creates a tag filter from a name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> AppResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AppError::Validation("tag name must not be empty".to_owned()));
        }

        Ok(Self {
            name: name.trim().to_owned(),
            value: value.into(),
        })
    }

    /// Parses `name=value` notation.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let (name, value) = raw.split_once('=').ok_or_else(|| {
            AppError::Validation(format!("tag filter '{raw}' must use 'name=value' notation"))
        })?;

        Self::new(name, value.trim())
    }

    /// Returns the tag name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the tag value.
    #[must_use]
    pub fn value(&self) -> &str {
        self.value.as_str()
    }

    /// Returns whether a tag map satisfies this filter.
    #[must_use]
    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        tags.iter().any(|(name, value)| {
            name.eq_ignore_ascii_case(self.name.as_str()) && value == &self.value
        })
    }

    /// Renders the provider-side OData filter expression.
    #[must_use]
    pub fn to_odata_filter(&self) -> String {
        format!(
            "tagName eq '{}' and tagValue eq '{}'",
            self.name.replace('\'', "''"),
            self.value.replace('\'', "''")
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::TagFilter;

    #[test]
    fn tag_filter_matches_name_case_insensitively() {
        let filter = TagFilter::new("Automation", "vm-disk");
        let tags = BTreeMap::from([("automation".to_owned(), "vm-disk".to_owned())]);

        assert!(filter.map(|filter| filter.matches(&tags)).unwrap_or(false));
    }

    #[test]
    fn tag_filter_compares_values_exactly() {
        let filter = TagFilter::new("Automation", "vm-disk");
        let tags = BTreeMap::from([("Automation".to_owned(), "VM-DISK".to_owned())]);

        assert!(!filter.map(|filter| filter.matches(&tags)).unwrap_or(true));
    }

    #[test]
    fn tag_filter_parse_requires_separator() {
        assert!(TagFilter::parse("Automation").is_err());
    }

    #[test]
    fn odata_filter_escapes_quotes() {
        let filter = TagFilter::parse("owner=o'brien");
        assert_eq!(
            filter.map(|filter| filter.to_odata_filter()).unwrap_or_default(),
            "tagName eq 'owner' and tagValue eq 'o''brien'"
        );
    }
}
