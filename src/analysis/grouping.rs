//! Tag-based grouping and filtering of collected resources.
//!
//! Grouping buckets resources by the value of one tag key. Filtering keeps
//! a single bucket and is only defined relative to an active grouping key.

use crate::config::ConfigError;
use crate::models::ResourceRecord;
use std::collections::BTreeMap;

/// Resources bucketed by the value of one tag key.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedView {
    key: String,
    buckets: BTreeMap<String, Vec<ResourceRecord>>,
}

impl GroupedView {
    /// The tag key resources were grouped by.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn buckets(&self) -> &BTreeMap<String, Vec<ResourceRecord>> {
        &self.buckets
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Keeps only the bucket for `value`.
    pub fn filter_by(&mut self, value: &str) {
        self.buckets.retain(|bucket, _| bucket == value);
    }
}

/// Groups `resources` by the value of `key`.
///
/// Records without the key are left out. Within a bucket, records keep the
/// order in which they appear in `resources`.
pub fn group_by(resources: &[ResourceRecord], key: &str) -> GroupedView {
    let mut buckets: BTreeMap<String, Vec<ResourceRecord>> = BTreeMap::new();

    for resource in resources {
        if let Some(value) = resource.tag(key) {
            buckets
                .entry(value.to_string())
                .or_default()
                .push(resource.clone());
        }
    }

    GroupedView {
        key: key.to_string(),
        buckets,
    }
}

/// What the renderer receives: the whole set, or a grouped view of it.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceView {
    Flat(Vec<ResourceRecord>),
    Grouped(GroupedView),
}

impl ResourceView {
    /// Regroups the view by `key`.
    pub fn group_by(self, key: &str) -> ResourceView {
        let resources = match self {
            ResourceView::Flat(resources) => resources,
            ResourceView::Grouped(view) => view.buckets.into_values().flatten().collect(),
        };
        ResourceView::Grouped(group_by(&resources, key))
    }

    /// Restricts a grouped view to one tag value.
    ///
    /// Filtering a flat view is a configuration error.
    pub fn filter_by(self, value: &str) -> Result<ResourceView, ConfigError> {
        match self {
            ResourceView::Flat(_) => Err(ConfigError::FilterWithoutGroup),
            ResourceView::Grouped(mut view) => {
                view.filter_by(value);
                Ok(ResourceView::Grouped(view))
            }
        }
    }

    /// Every resource in the view.
    pub fn resources(&self) -> Vec<&ResourceRecord> {
        match self {
            ResourceView::Flat(resources) => resources.iter().collect(),
            ResourceView::Grouped(view) => view.buckets.values().flatten().collect(),
        }
    }
}

/// Grouping key with an optional filter value, validated together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSelection {
    key: String,
    filter: Option<String>,
}

impl TagSelection {
    /// Builds a selection; a filter without a key is rejected.
    pub fn new(key: Option<&str>, filter: Option<&str>) -> Result<Option<Self>, ConfigError> {
        match (key, filter) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(ConfigError::FilterWithoutGroup),
            (Some(""), _) => Err(ConfigError::EmptyTagKey),
            (Some(key), filter) => Ok(Some(Self {
                key: key.to_string(),
                filter: filter.map(String::from),
            })),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }
}

/// Builds the view handed to the renderer: flat without a selection,
/// otherwise grouped by its key and filtered by its value, if any.
pub fn build_view(
    resources: Vec<ResourceRecord>,
    selection: Option<&TagSelection>,
) -> Result<ResourceView, ConfigError> {
    let view = ResourceView::Flat(resources);
    let selection = match selection {
        Some(selection) => selection,
        None => return Ok(view),
    };

    let view = view.group_by(selection.key());
    match selection.filter() {
        Some(value) => view.filter_by(value),
        None => Ok(view),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ResourceRecord> {
        vec![
            ResourceRecord::new("ec2", "us-east-1", "i-1").with_tag("env", "prod"),
            ResourceRecord::new("ec2", "us-east-1", "i-2").with_tag("env", "dev"),
            ResourceRecord::new("rds", "us-east-1", "db-1").with_tag("env", "prod"),
            ResourceRecord::new("sqs", "us-east-1", "q-1"),
            ResourceRecord::new("sqs", "eu-west-1", "q-2").with_tag("env", "prod"),
        ]
    }

    #[test]
    fn test_group_by_excludes_untagged() {
        let view = group_by(&sample(), "env");

        assert_eq!(view.key(), "env");
        assert_eq!(view.buckets().len(), 2);
        assert_eq!(view.buckets().get("prod").map(Vec::len), Some(3));
        assert_eq!(view.buckets().get("dev").map(Vec::len), Some(1));
        assert!(view
            .buckets()
            .values()
            .flatten()
            .all(|r| r.id != "q-1"));
    }

    #[test]
    fn test_group_by_preserves_order() {
        let view = group_by(&sample(), "env");
        let ids: Vec<_> = view.buckets()["prod"].iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["i-1", "db-1", "q-2"]);
    }

    #[test]
    fn test_group_by_missing_key_is_empty() {
        let view = group_by(&sample(), "owner");
        assert!(view.is_empty());
    }

    #[test]
    fn test_filter_after_group() {
        let view = ResourceView::Flat(sample())
            .group_by("env")
            .filter_by("prod")
            .unwrap();

        match view {
            ResourceView::Grouped(ref grouped) => {
                assert_eq!(grouped.buckets().len(), 1);
                assert_eq!(grouped.buckets().get("prod").map(Vec::len), Some(3));
            }
            ResourceView::Flat(_) => panic!("expected grouped view"),
        }
        assert_eq!(view.resources().len(), 3);
    }

    #[test]
    fn test_filter_without_group_is_error() {
        let result = ResourceView::Flat(sample()).filter_by("prod");
        assert_eq!(result.unwrap_err(), ConfigError::FilterWithoutGroup);
    }

    #[test]
    fn test_filter_unknown_value_is_empty() {
        let view = ResourceView::Flat(sample())
            .group_by("env")
            .filter_by("staging")
            .unwrap();
        assert!(view.resources().is_empty());
    }

    #[test]
    fn test_tag_selection_validation() {
        assert_eq!(TagSelection::new(None, None).unwrap(), None);
        assert_eq!(
            TagSelection::new(None, Some("prod")).unwrap_err(),
            ConfigError::FilterWithoutGroup
        );
        assert_eq!(
            TagSelection::new(Some(""), None).unwrap_err(),
            ConfigError::EmptyTagKey
        );

        let selection = TagSelection::new(Some("env"), Some("prod")).unwrap().unwrap();
        assert_eq!(selection.key(), "env");
        assert_eq!(selection.filter(), Some("prod"));
    }

    #[test]
    fn test_build_view() {
        let flat = build_view(sample(), None).unwrap();
        assert!(matches!(flat, ResourceView::Flat(ref r) if r.len() == 5));

        let selection = TagSelection::new(Some("env"), None).unwrap().unwrap();
        let grouped = build_view(sample(), Some(&selection)).unwrap();
        match grouped {
            ResourceView::Grouped(ref view) => {
                let values: Vec<_> = view.buckets().keys().map(String::as_str).collect();
                assert_eq!(values, vec!["dev", "prod"]);
            }
            ResourceView::Flat(_) => panic!("expected grouped view"),
        }
        assert_eq!(grouped.resources().len(), 4);
    }

    #[test]
    fn test_build_view_filters_selection() {
        let selection = TagSelection::new(Some("env"), Some("dev")).unwrap().unwrap();
        let view = build_view(sample(), Some(&selection)).unwrap();
        let ids: Vec<_> = view.resources().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["i-2"]);
    }
}
