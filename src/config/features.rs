//! Feature flags for optional journal steps.

/// Optional steps of the daily journal run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalFeatures {
    /// Regenerate the `## 7-Day Summary` section.
    pub summary_7: bool,
    /// Regenerate the `## 30-Day Summary` section.
    pub summary_30: bool,
    /// Run the lifelog sync after the note is saved.
    pub lifelog_sync: bool,
    /// Commit the journal directory after the note is saved.
    pub git: bool,
}

impl Default for JournalFeatures {
    fn default() -> Self {
        Self {
            summary_7: true,
            summary_30: true,
            lifelog_sync: false,
            git: true,
        }
    }
}

impl JournalFeatures {
    /// Creates feature flags with all features disabled.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            summary_7: false,
            summary_30: false,
            lifelog_sync: false,
            git: false,
        }
    }

    /// Creates feature flags with all features enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            summary_7: true,
            summary_30: true,
            lifelog_sync: true,
            git: true,
        }
    }

    /// Whether any step needs the LLM.
    #[must_use]
    pub const fn needs_llm(&self) -> bool {
        self.summary_7 || self.summary_30
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_disables_everything() {
        let flags = JournalFeatures::none();
        assert!(!flags.needs_llm());
        assert!(!flags.lifelog_sync);
        assert!(!flags.git);
    }

    #[test]
    fn test_default_skips_lifelog() {
        let flags = JournalFeatures::default();
        assert!(flags.needs_llm());
        assert!(!flags.lifelog_sync);
        assert!(JournalFeatures::all().lifelog_sync);
    }
}
