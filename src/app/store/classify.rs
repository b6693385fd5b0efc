//! Keyword classification into mirror labels

use std::collections::BTreeMap;

use crate::app::models::CandidateItem;
use crate::constants::FALLBACK_LABEL;

/// Metadata fields whose text feeds classification
const TEXT_FIELDS: &[&str] = &["caption", "copyright", "description"];

/// Maps item text to zero or more labels by keyword containment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordClassifier {
    rules: BTreeMap<String, Vec<String>>,
    fallback: Option<String>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(default_rules(), Some(FALLBACK_LABEL.to_string()))
    }
}

/// Built-in label table
pub fn default_rules() -> BTreeMap<String, Vec<String>> {
    let words = |list: &[&str]| list.iter().map(|w| w.to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        (
            "animals".to_string(),
            words(&[
                "animal", "wildlife", "bird", "toucan", "lynx", "penguin", "bear", "fox",
                "tiger", "lion", "动物", "鸟", "企鹅", "熊", "狐狸",
            ]),
        ),
        (
            "nature".to_string(),
            words(&[
                "nature", "landscape", "mountain", "forest", "lake", "river", "waterfall",
                "desert", "ocean", "beach", "aurora", "canyon", "自然", "风景", "山", "森林",
                "湖", "瀑布", "海",
            ]),
        ),
    ])
}

impl KeywordClassifier {
    /// Keywords are matched case-insensitively
    pub fn new(rules: BTreeMap<String, Vec<String>>, fallback: Option<String>) -> Self {
        let rules = rules
            .into_iter()
            .map(|(label, words)| {
                let words = words
                    .into_iter()
                    .map(|w| w.trim().to_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect();
                (label, words)
            })
            .collect();
        Self {
            rules,
            fallback: fallback.filter(|f| !f.trim().is_empty()),
        }
    }

    /// Labels whose keywords occur in `text`, or the fallback label
    pub fn classify(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        let mut labels: Vec<String> = self
            .rules
            .iter()
            .filter(|(_, words)| words.iter().any(|w| text.contains(w.as_str())))
            .map(|(label, _)| label.clone())
            .collect();
        if labels.is_empty() {
            labels.extend(self.fallback.clone());
        }
        labels
    }

    /// Classify title, tags and descriptive metadata of an item
    pub fn classify_item(&self, item: &CandidateItem) -> Vec<String> {
        let mut text = String::new();
        if let Some(title) = &item.title {
            text.push_str(title);
        }
        for tag in &item.tags {
            text.push(' ');
            text.push_str(tag);
        }
        for field in TEXT_FIELDS {
            if let Some(value) = item.metadata.get(*field).and_then(|v| v.as_str()) {
                text.push(' ');
                text.push_str(value);
            }
        }
        self.classify(&text)
    }
}
