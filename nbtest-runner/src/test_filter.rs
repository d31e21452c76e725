// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Name-based filtering of notebooks.

use crate::errors::TestFilterBuildError;
use aho_corasick::AhoCorasick;

/// A filter for notebooks, matching substrings of their identifiers.
#[derive(Clone, Debug)]
pub struct TestFilter {
    name_match: NameMatch,
}

#[derive(Clone, Debug)]
enum NameMatch {
    MatchAll,
    MatchSet(Box<AhoCorasick>),
}

impl TestFilter {
    /// Creates a new `TestFilter` from the given patterns.
    ///
    /// If an empty slice is passed, the filter matches all possible notebook names.
    pub fn new(patterns: &[impl AsRef<[u8]>]) -> Result<Self, TestFilterBuildError> {
        let name_match = if patterns.is_empty() {
            NameMatch::MatchAll
        } else {
            NameMatch::MatchSet(Box::new(AhoCorasick::new(patterns)?))
        };
        Ok(Self { name_match })
    }

    /// Creates a new `TestFilter` that matches every notebook.
    pub fn any() -> Self {
        Self {
            name_match: NameMatch::MatchAll,
        }
    }

    /// Returns true if the notebook identifier matches this filter.
    pub fn is_match(&self, notebook: &str) -> bool {
        match &self.name_match {
            NameMatch::MatchAll => true,
            NameMatch::MatchSet(set) => set.is_match(notebook),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::{collection::vec, prelude::*};

    proptest! {
        #[test]
        fn proptest_empty(names in vec(any::<String>(), 0..16)) {
            let patterns: &[String] = &[];
            let filter = TestFilter::new(patterns).expect("empty filter builds");
            for name in names {
                prop_assert!(filter.is_match(&name));
            }
        }

        // Test that exact names match.
        #[test]
        fn proptest_exact(names in vec(any::<String>(), 0..16)) {
            let filter = TestFilter::new(&names).expect("filter builds");
            for name in names {
                prop_assert!(filter.is_match(&name));
            }
        }

        // Test that substrings match.
        #[test]
        fn proptest_substring(
            substring_prefix_suffixes in vec([any::<String>(); 3], 0..16),
        ) {
            let mut patterns = Vec::with_capacity(substring_prefix_suffixes.len());
            let mut names = Vec::with_capacity(substring_prefix_suffixes.len());
            for [substring, prefix, suffix] in substring_prefix_suffixes {
                names.push(prefix + &substring + &suffix);
                patterns.push(substring);
            }

            let filter = TestFilter::new(&patterns).expect("filter builds");
            for name in names {
                prop_assert!(filter.is_match(&name));
            }
        }

        // Test that dropping a character from a string doesn't match.
        #[test]
        fn proptest_no_match(
            substring in any::<String>(),
            prefix in any::<String>(),
            suffix in any::<String>(),
        ) {
            prop_assume!(!substring.is_empty() && !(prefix.is_empty() && suffix.is_empty()));
            let pattern = prefix + &substring + &suffix;
            let filter = TestFilter::new(&[&pattern]).expect("filter builds");
            prop_assert!(!filter.is_match(&substring));
        }
    }

    #[test]
    fn notebook_names() {
        let filter = TestFilter::new(&["inversion"]).expect("filter builds");
        assert!(filter.is_match("5-DC_inversion_3D.ipynb"));
        assert!(filter.is_match("advanced/8-IP_inversion_3D.ipynb"));
        assert!(!filter.is_match("1-intro.ipynb"));
        assert!(TestFilter::any().is_match("1-intro.ipynb"));
    }
}
