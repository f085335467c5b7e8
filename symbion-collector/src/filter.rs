use crate::aggregator::TRACKED_INDEXES;

/// Cheap prefix test applied to raw lines before the codec runs.
#[derive(Debug, Clone)]
pub struct LineFilter {
    allowed: Vec<String>,
}

impl LineFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    /// True iff the line starts with one of the allowed index names/prefixes.
    pub fn matches(&self, line: &str) -> bool {
        self.allowed.iter().any(|prefix| line.starts_with(prefix.as_str()))
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }
}

impl Default for LineFilter {
    /// Accepte les quatre index suivis par l'agrégateur
    fn default() -> Self {
        Self::new(TRACKED_INDEXES)
    }
}
