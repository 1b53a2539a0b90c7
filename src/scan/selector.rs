/// How an attribute has to look for a [`Selector`] to match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrMatch {
    Equals(String),
    Contains(String),
}

/// A small subset of CSS selectors: an optional tag plus an optional
/// attribute condition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selector {
    pub tag: Option<String>,
    pub attr: Option<(String, AttrMatch)>,
}

impl Selector {
    pub fn tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            attr: None,
        }
    }

    pub fn attr_equals(name: &str, value: &str) -> Self {
        Self {
            tag: None,
            attr: Some((name.to_string(), AttrMatch::Equals(value.to_string()))),
        }
    }

    pub fn attr_contains(name: &str, needle: &str) -> Self {
        Self {
            tag: None,
            attr: Some((name.to_string(), AttrMatch::Contains(needle.to_string()))),
        }
    }

    /// `.name`
    pub fn class(name: &str) -> Self {
        Self::attr_contains("class", name)
    }

    /// Narrows the selector to elements with `tag`.
    pub fn on(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn matches(&self, tag: &str, attr: impl Fn(&str) -> Option<String>) -> bool {
        if let Some(expected) = &self.tag {
            if !expected.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        match &self.attr {
            None => true,
            Some((name, rule)) => match (attr(name), rule) {
                (None, _) => false,
                (Some(value), AttrMatch::Equals(expected)) => value == *expected,
                (Some(value), AttrMatch::Contains(needle)) => value.contains(needle.as_str()),
            },
        }
    }
}
