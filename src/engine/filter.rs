use std::collections::HashSet;

/// Allow-list of HTTP methods, matched case-insensitively.
///
/// An empty filter allows everything. CONNECT is never consulted against the
/// filter; tunneling is gated by its own config flag.
#[derive(Debug, Clone, Default)]
pub struct MethodFilter {
    allowed: HashSet<String>,
}

impl MethodFilter {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: methods
                .into_iter()
                .map(|m| m.as_ref().trim().to_ascii_uppercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn allows(&self, method: &str) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&method.to_ascii_uppercase())
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_allows_everything() {
        let filter = MethodFilter::default();
        assert!(filter.allows("GET"));
        assert!(filter.allows("BREW"));
    }

    #[test]
    fn membership_is_case_insensitive() {
        let filter = MethodFilter::new(["get", "Post"]);
        assert!(filter.allows("GET"));
        assert!(filter.allows("post"));
        assert!(!filter.allows("DELETE"));
    }

    #[test]
    fn whitespace_entries_are_ignored() {
        let filter = MethodFilter::new([" GET ", ""]);
        assert!(!filter.is_empty());
        assert!(filter.allows("GET"));
        assert!(!filter.allows("PUT"));
    }
}
