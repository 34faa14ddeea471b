//! Keyword dictionaries shared by the text-based sub-scores.

use std::collections::{BTreeMap, BTreeSet};

static DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    ("경제", &["경제", "일자리", "고용", "산업", "투자", "세제"]),
    ("복지", &["복지", "연금", "의료", "돌봄", "보육"]),
    ("교육", &["교육", "학교", "대학", "학생"]),
    ("환경", &["환경", "기후", "탄소", "에너지"]),
    ("안전", &["안전", "재난", "범죄", "치안"]),
    ("지역", &["지역", "균형발전", "지방", "농어촌"]),
];

/// Category → keyword lists used when scanning free-text fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTables {
    categories: BTreeMap<String, Vec<String>>,
}

impl Default for LookupTables {
    fn default() -> Self {
        let categories = DEFAULT_CATEGORIES
            .iter()
            .map(|(name, words)| {
                (
                    name.to_string(),
                    words.iter().map(|w| w.to_string()).collect(),
                )
            })
            .collect();
        Self { categories }
    }
}

impl LookupTables {
    /// Builds tables from configured categories, falling back to the
    /// built-in ones when none are configured. Blank keywords are dropped.
    pub fn new(categories: BTreeMap<String, Vec<String>>) -> Self {
        let categories: BTreeMap<String, Vec<String>> = categories
            .into_iter()
            .map(|(name, words)| {
                let words = words
                    .into_iter()
                    .map(|w| w.trim().to_string())
                    .filter(|w| !w.is_empty())
                    .collect::<Vec<_>>();
                (name, words)
            })
            .filter(|(_, words)| !words.is_empty())
            .collect();

        if categories.is_empty() {
            Self::default()
        } else {
            Self { categories }
        }
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    /// Categories with at least one keyword contained in `text`.
    pub fn categories_hit(&self, text: &str) -> BTreeSet<&str> {
        self.categories
            .iter()
            .filter(|(_, words)| words.iter().any(|w| text.contains(w.as_str())))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Fraction of categories touched by `text`, or `None` with no categories.
    pub fn breadth(&self, text: &str) -> Option<f64> {
        if self.categories.is_empty() {
            return None;
        }
        Some(self.categories_hit(text).len() as f64 / self.categories.len() as f64)
    }
}
