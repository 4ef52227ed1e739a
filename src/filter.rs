/// Case-insensitive substring filter over message text.
///
/// An empty keyword list is pass-through: every message matches.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    /// Build a filter from raw keywords. Entries are trimmed and lowercased;
    /// blanks and repeats are dropped, first occurrence wins.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if keyword.is_empty() || normalized.contains(&keyword) {
                continue;
            }
            normalized.push(keyword);
        }
        Self {
            keywords: normalized,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    /// Whether the message should be forwarded.
    pub fn matches(&self, text: &str) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        self.first_match(text).is_some()
    }

    /// First configured keyword found in `text`, in configured order.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| text.contains(keyword.as_str()))
            .map(String::as_str)
    }
}
