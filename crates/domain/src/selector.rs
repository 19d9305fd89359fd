use serde::{Deserialize, Serialize};

/// Wildcard accepted by fan-out endpoints to address every VM in a group.
pub const ALL_VIRTUAL_MACHINES: &str = "*";

/// Caller-supplied selection of virtual machine names within one resource group.
///
/// Parsing is literal: comma lists keep their order and duplicates, and no
/// whitespace is trimmed from individual names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "names", rename_all = "snake_case")]
pub enum NameSelector {
    /// Every VM returned by a directory listing.
    All,
    /// An explicit, ordered list of names.
    Names(Vec<String>),
}

impl NameSelector {
    /// Parses an optional raw selector; absent, empty, or `*` selects all.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => Self::All,
            Some(value) if value.is_empty() || value == ALL_VIRTUAL_MACHINES => Self::All,
            Some(value) if value.contains(',') => {
                Self::Names(value.split(',').map(ToOwned::to_owned).collect())
            }
            Some(value) => Self::Names(vec![value.to_owned()]),
        }
    }

    /// Returns true when the selector needs a directory listing to resolve.
    #[must_use]
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl From<&str> for NameSelector {
    fn from(value: &str) -> Self {
        Self::parse(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::NameSelector;

    #[test]
    fn missing_empty_and_wildcard_select_all() {
        assert_eq!(NameSelector::parse(None), NameSelector::All);
        assert_eq!(NameSelector::parse(Some("")), NameSelector::All);
        assert_eq!(NameSelector::parse(Some("*")), NameSelector::All);
    }

    #[test]
    fn single_name_is_kept_verbatim() {
        assert_eq!(
            NameSelector::from("vm-a"),
            NameSelector::Names(vec!["vm-a".to_owned()])
        );
    }

    #[test]
    fn comma_list_keeps_order_and_duplicates() {
        assert_eq!(
            NameSelector::from("a,b,b"),
            NameSelector::Names(vec!["a".to_owned(), "b".to_owned(), "b".to_owned()])
        );
    }

    proptest! {
        #[test]
        fn comma_joined_names_split_back_in_order(
            names in proptest::collection::vec("[a-z0-9-]{1,12}", 2..8)
        ) {
            let selector = NameSelector::from(names.join(",").as_str());
            prop_assert_eq!(selector, NameSelector::Names(names));
        }
    }
}
