//! Guidelines: named natural-language rubrics.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::error::{EvalError, Result};

/// A named instruction used as a compliance rubric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guideline {
    /// Unique within a set.
    pub title: String,
    pub instruction: String,
}

impl Guideline {
    pub fn new(title: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            instruction: instruction.into(),
        }
    }
}

/// Ordered, validated set of guidelines.
///
/// # Invariants
///
/// At least one guideline; every title is non-empty and unique. Declaration
/// order is preserved and drives output ordering downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GuidelineSet {
    guidelines: Vec<Guideline>,
}

impl GuidelineSet {
    pub fn new(guidelines: Vec<Guideline>) -> Result<Self> {
        if guidelines.is_empty() {
            return Err(EvalError::NoGuidelines);
        }

        let mut seen = HashSet::new();
        for (index, g) in guidelines.iter().enumerate() {
            if g.title.trim().is_empty() {
                return Err(EvalError::EmptyGuidelineTitle { index });
            }
            if !seen.insert(g.title.as_str()) {
                return Err(EvalError::DuplicateGuideline {
                    title: g.title.clone(),
                });
            }
        }

        Ok(Self { guidelines })
    }

    pub fn as_slice(&self) -> &[Guideline] {
        &self.guidelines
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Guideline> {
        self.guidelines.iter()
    }

    pub fn len(&self) -> usize {
        self.guidelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guidelines.is_empty()
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.guidelines.iter().map(|g| g.title.as_str())
    }

    pub fn get(&self, title: &str) -> Option<&Guideline> {
        self.guidelines.iter().find(|g| g.title == title)
    }

    /// Subset in declaration order of this set, by title.
    pub fn select(&self, titles: &[String]) -> Result<Self> {
        for title in titles {
            if self.get(title).is_none() {
                return Err(EvalError::UnknownGuideline {
                    title: title.clone(),
                });
            }
        }
        Self::new(
            self.guidelines
                .iter()
                .filter(|g| titles.contains(&g.title))
                .cloned()
                .collect(),
        )
    }

    /// SHA-256 hex digest of the canonical JSON encoding.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.guidelines)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

impl<'a> IntoIterator for &'a GuidelineSet {
    type Item = &'a Guideline;
    type IntoIter = std::slice::Iter<'a, Guideline>;

    fn into_iter(self) -> Self::IntoIter {
        self.guidelines.iter()
    }
}

impl<'de> Deserialize<'de> for GuidelineSet {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let guidelines = Vec::<Guideline>::deserialize(deserializer)?;
        GuidelineSet::new(guidelines).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> GuidelineSet {
        GuidelineSet::new(vec![
            Guideline::new("Greeting", "Open by thanking the reviewer."),
            Guideline::new("Signature", "Sign off with the team name."),
        ])
        .unwrap()
    }

    #[test]
    fn test_rejects_empty_set() {
        assert!(matches!(
            GuidelineSet::new(vec![]),
            Err(EvalError::NoGuidelines)
        ));
    }

    #[test]
    fn test_rejects_duplicate_titles() {
        let err = GuidelineSet::new(vec![
            Guideline::new("Tone", "a"),
            Guideline::new("Tone", "b"),
        ])
        .unwrap_err();
        assert!(matches!(err, EvalError::DuplicateGuideline { title } if title == "Tone"));
    }

    #[test]
    fn test_rejects_blank_title() {
        let err = GuidelineSet::new(vec![Guideline::new("ok", "a"), Guideline::new(" ", "b")])
            .unwrap_err();
        assert!(matches!(err, EvalError::EmptyGuidelineTitle { index: 1 }));
    }

    #[test]
    fn test_select_keeps_declaration_order() {
        let subset = set()
            .select(&["Signature".to_string(), "Greeting".to_string()])
            .unwrap();
        let titles: Vec<_> = subset.titles().collect();
        assert_eq!(titles, vec!["Greeting", "Signature"]);
    }

    #[test]
    fn test_select_unknown_title_is_fatal() {
        let err = set().select(&["Emoji".to_string()]).unwrap_err();
        assert!(matches!(err, EvalError::UnknownGuideline { .. }));
    }

    #[test]
    fn test_digest_is_stable_and_order_sensitive() {
        let a = set();
        let b = set();
        assert_eq!(a.digest().unwrap(), b.digest().unwrap());
        assert_eq!(a.digest().unwrap().len(), 64);

        let reversed = GuidelineSet::new(a.iter().rev().cloned().collect()).unwrap();
        assert_ne!(a.digest().unwrap(), reversed.digest().unwrap());
    }

    #[test]
    fn test_deserialize_validates() {
        let err = serde_json::from_str::<GuidelineSet>(
            r#"[{"title":"A","instruction":"x"},{"title":"A","instruction":"y"}]"#,
        );
        assert!(err.is_err());
    }
}
