//! Ordered aggregation table: group → guideline title → [`StatSummary`].

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::stats::StatSummary;

/// One guideline's summary within a group.
#[derive(Debug, Clone, PartialEq)]
pub struct GuidelineStats {
    pub title: String,
    pub summary: StatSummary,
}

/// All guideline summaries for one group (e.g. a CSV column).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub name: String,
    pub guidelines: Vec<GuidelineStats>,
}

impl GroupStats {
    pub fn get(&self, title: &str) -> Option<&StatSummary> {
        self.guidelines
            .iter()
            .find(|g| g.title == title)
            .map(|g| &g.summary)
    }
}

/// Group → guideline → summary, in insertion order.
///
/// Serializes as a nested JSON object whose keys appear in insertion
/// order, independent of the serializer's map implementation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregationTable {
    groups: Vec<GroupStats>,
}

impl AggregationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the summary of a cell, appending the group or title if new.
    pub fn insert(&mut self, group: &str, title: &str, summary: StatSummary) {
        let index = match self.groups.iter().position(|g| g.name == group) {
            Some(i) => i,
            None => {
                self.groups.push(GroupStats {
                    name: group.to_string(),
                    guidelines: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        let entries = &mut self.groups[index].guidelines;

        match entries.iter_mut().find(|g| g.title == title) {
            Some(entry) => entry.summary = summary,
            None => entries.push(GuidelineStats {
                title: title.to_string(),
                summary,
            }),
        }
    }

    pub fn get(&self, group: &str, title: &str) -> Option<&StatSummary> {
        self.group(group)?.get(title)
    }

    pub fn group(&self, name: &str) -> Option<&GroupStats> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn groups(&self) -> &[GroupStats] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

struct OrderedGuidelines<'a>(&'a [GuidelineStats]);

impl Serialize for OrderedGuidelines<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for g in self.0 {
            map.serialize_entry(&g.title, &g.summary)?;
        }
        map.end()
    }
}

impl Serialize for AggregationTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for g in &self.groups {
            map.serialize_entry(&g.name, &OrderedGuidelines(&g.guidelines))?;
        }
        map.end()
    }
}
