use std::collections::BTreeMap;

use serde::Serialize;

/// `LabelSet` is the labels of one target, ordered by label name.
pub type LabelSet = BTreeMap<String, String>;

/// The address of the target to scrape.
pub const ADDRESS_LABEL: &str = "__address__";
/// The scheme used to scrape the target.
pub const SCHEME_LABEL: &str = "__scheme__";
/// The HTTP path used to scrape the target.
pub const METRICS_PATH_LABEL: &str = "__metrics_path__";
/// Identifies the scraped target, it defaults to the address.
pub const INSTANCE_LABEL: &str = "instance";

/// TargetGroup is a set of targets with common labels
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TargetGroup {
    /// An identifier that describes a group of targets, groups published later
    /// replace the groups with the same source.
    pub source: String,

    /// `targets` is a list of targets identified by a label set. Each target
    /// is uniquely identifiable in the group by its `instance` label, or
    /// its `address` if `instance` is missing.
    pub targets: Vec<LabelSet>,

    /// `labels` is a set of labels that is common across all targets in the group
    pub labels: LabelSet,
}

impl TargetGroup {
    pub fn new(source: impl Into<String>, targets: Vec<LabelSet>) -> Self {
        Self {
            source: source.into(),
            targets,
            labels: LabelSet::new(),
        }
    }
}

/// Returns the identity of a target inside its group.
pub fn target_key(labels: &LabelSet) -> Option<&str> {
    labels
        .get(INSTANCE_LABEL)
        .or_else(|| labels.get(ADDRESS_LABEL))
        .map(String::as_str)
}
