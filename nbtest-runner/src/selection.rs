// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Picking the notebooks to skip for a run.
//!
//! Some notebooks are always skipped: they're too slow, or they need resources that aren't
//! available in CI. On top of that, a number of the remaining notebooks can be skipped at
//! random so that the total time of a run stays bounded while every notebook still gets
//! exercised over many runs.
//!
//! The random source is always passed in explicitly, so a run can be reproduced from its seed.

use crate::{discovery::DiscoveredNotebooks, errors::SelectionError};
use nbtest_metadata::{SamplingPolicySummary, SelectionSummary, SkipReasonSummary};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::index};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use tracing::{debug, info, warn};

/// How random exclusions are drawn from the candidate notebooks.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingPolicy {
    /// Every draw is independent, so the same notebook can be drawn more than once and fewer
    /// than the requested number of notebooks may end up excluded.
    WithReplacement,

    /// Draws are distinct: exactly the requested number of notebooks is excluded.
    ///
    /// This is the default.
    #[default]
    WithoutReplacement,
}

impl SamplingPolicy {
    /// Returns the string representations of all variants.
    pub fn variants() -> [&'static str; 2] {
        ["with-replacement", "without-replacement"]
    }

    /// Draws `amount` indexes in `0..len`.
    ///
    /// Returns `None` if the draw isn't possible with this policy.
    fn draw_indexes<R: Rng>(
        self,
        rng: &mut R,
        len: usize,
        amount: usize,
    ) -> Option<Vec<usize>> {
        if amount == 0 {
            return Some(Vec::new());
        }
        match self {
            SamplingPolicy::WithReplacement => {
                if len == 0 {
                    return None;
                }
                Some((0..amount).map(|_| rng.random_range(0..len)).collect())
            }
            SamplingPolicy::WithoutReplacement => {
                if amount > len {
                    return None;
                }
                Some(index::sample(rng, len, amount).into_vec())
            }
        }
    }

    pub(crate) fn to_summary(self) -> SamplingPolicySummary {
        match self {
            SamplingPolicy::WithReplacement => SamplingPolicySummary::WithReplacement,
            SamplingPolicy::WithoutReplacement => SamplingPolicySummary::WithoutReplacement,
        }
    }
}

impl fmt::Display for SamplingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingPolicy::WithReplacement => write!(f, "with-replacement"),
            SamplingPolicy::WithoutReplacement => write!(f, "without-replacement"),
        }
    }
}

/// Why a notebook is in an [`ExclusionSet`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ExclusionReason {
    /// The notebook is in the fixed ignore list.
    FixedIgnore,

    /// The notebook was drawn at random.
    Random,
}

impl ExclusionReason {
    pub(crate) fn to_summary(self) -> SkipReasonSummary {
        match self {
            ExclusionReason::FixedIgnore => SkipReasonSummary::FixedIgnore,
            ExclusionReason::Random => SkipReasonSummary::Random,
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_summary())
    }
}

/// The notebooks skipped by a run, as computed by [`select_exclusions`].
///
/// Every member is a discovered notebook. Fixed ignore entries that don't name a discovered
/// notebook are kept aside in [`Self::unmatched_ignores`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExclusionSet {
    excluded: BTreeMap<String, ExclusionReason>,
    unmatched_ignores: BTreeSet<String>,
}

impl ExclusionSet {
    /// Returns true if the notebook is excluded.
    pub fn contains(&self, notebook: &str) -> bool {
        self.excluded.contains_key(notebook)
    }

    /// Returns the reason a notebook is excluded, or `None` if it isn't.
    pub fn reason(&self, notebook: &str) -> Option<ExclusionReason> {
        self.excluded.get(notebook).copied()
    }

    /// Returns the number of excluded notebooks.
    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    /// Returns true if no notebooks are excluded.
    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    /// Iterates over the excluded notebooks in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ExclusionReason)> + '_ {
        self.excluded
            .iter()
            .map(|(name, reason)| (name.as_str(), *reason))
    }

    /// Returns the fixed ignore entries that don't name a discovered notebook.
    pub fn unmatched_ignores(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.unmatched_ignores.iter().map(|s| s.as_str())
    }
}

/// Returns the notebooks in `all_notebooks` that aren't in `fixed_ignore`, in order.
pub fn candidates<'a, S: AsRef<str>>(
    all_notebooks: &'a [S],
    fixed_ignore: &BTreeSet<String>,
) -> Vec<&'a str> {
    all_notebooks
        .iter()
        .map(|name| name.as_ref())
        .filter(|name| !fixed_ignore.contains(*name))
        .collect()
}

/// Computes the set of notebooks to skip.
///
/// The result is every notebook in `fixed_ignore` that is also in `all_notebooks`, plus `n`
/// draws from the remaining notebooks made with `rng` according to `policy`.
///
/// Returns [`SelectionError::InvalidSampleRange`] if `n > 0` and no candidates remain, or if
/// `policy` is [`SamplingPolicy::WithoutReplacement`] and `n` is more than the number of
/// candidates.
pub fn select_exclusions<S, R>(
    all_notebooks: &[S],
    fixed_ignore: &BTreeSet<String>,
    n: usize,
    policy: SamplingPolicy,
    rng: &mut R,
) -> Result<ExclusionSet, SelectionError>
where
    S: AsRef<str>,
    R: Rng,
{
    let candidates = candidates(all_notebooks, fixed_ignore);
    let indexes = policy.draw_indexes(rng, candidates.len(), n).ok_or(
        SelectionError::InvalidSampleRange {
            candidates: candidates.len(),
            requested: n,
            policy,
        },
    )?;
    debug!(
        candidates = candidates.len(),
        ?indexes,
        %policy,
        "drew random exclusions"
    );

    Ok(exclusions_from_draws(
        all_notebooks,
        fixed_ignore,
        &candidates,
        &indexes,
    ))
}

/// Builds the exclusion set from already-drawn indexes into `candidates`.
fn exclusions_from_draws<S: AsRef<str>>(
    all_notebooks: &[S],
    fixed_ignore: &BTreeSet<String>,
    candidates: &[&str],
    indexes: &[usize],
) -> ExclusionSet {
    let mut excluded = BTreeMap::new();
    let mut unmatched_ignores = fixed_ignore.clone();

    for name in all_notebooks {
        let name = name.as_ref();
        if unmatched_ignores.remove(name) {
            excluded.insert(name.to_owned(), ExclusionReason::FixedIgnore);
        }
    }

    for &index in indexes {
        // Duplicate draws collapse into one entry.
        excluded.insert(candidates[index].to_owned(), ExclusionReason::Random);
    }

    ExclusionSet {
        excluded,
        unmatched_ignores,
    }
}

/// The inputs to the selection policy, as gathered from configuration and the command line.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SelectionConfig {
    /// Notebooks that are always skipped.
    pub fixed_ignore: BTreeSet<String>,

    /// The number of additional notebooks to skip at random.
    pub random_exclusions: usize,

    /// How random exclusions are drawn.
    pub sampling: SamplingPolicy,

    /// The seed for the random source. If `None`, a seed is generated.
    pub seed: Option<u64>,
}

impl SelectionConfig {
    /// Computes the exclusion set for the discovered notebooks.
    ///
    /// The random source is a [`StdRng`] seeded from [`Self::seed`], so the same seed and the
    /// same notebooks always produce the same selection.
    pub fn select(&self, discovered: &DiscoveredNotebooks) -> Result<Selection, SelectionError> {
        let (seed, generated) = match self.seed {
            Some(seed) => (seed, false),
            None => (rand::rng().random(), true),
        };
        if self.random_exclusions > 0 {
            if generated {
                info!(
                    "random exclusions use generated seed {seed} \
                     (pass --seed {seed} to reproduce)"
                );
            } else {
                info!("random exclusions use seed {seed}");
            }
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let exclusions = select_exclusions(
            &discovered.ids(),
            &self.fixed_ignore,
            self.random_exclusions,
            self.sampling,
            &mut rng,
        )?;

        for name in exclusions.unmatched_ignores() {
            warn!(
                "ignored notebook `{name}` was not found in {}",
                discovered.dir()
            );
        }

        Ok(Selection {
            exclusions,
            sampling: self.sampling,
            random_exclusions: self.random_exclusions,
            seed,
        })
    }
}

/// The result of running the selection policy for one run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Selection {
    exclusions: ExclusionSet,
    sampling: SamplingPolicy,
    random_exclusions: usize,
    seed: u64,
}

impl Selection {
    /// Creates a selection that excludes nothing.
    pub fn empty() -> Self {
        Self {
            exclusions: ExclusionSet::default(),
            sampling: SamplingPolicy::default(),
            random_exclusions: 0,
            seed: 0,
        }
    }

    /// Returns the notebooks to skip.
    pub fn exclusions(&self) -> &ExclusionSet {
        &self.exclusions
    }

    /// Returns the sampling policy used.
    pub fn sampling(&self) -> SamplingPolicy {
        self.sampling
    }

    /// Returns the number of random exclusions requested.
    pub fn random_exclusions(&self) -> usize {
        self.random_exclusions
    }

    /// Returns the seed the random source was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn to_summary(&self) -> SelectionSummary {
        SelectionSummary {
            sampling: self.sampling.to_summary(),
            random_exclusions: self.random_exclusions,
            seed: self.seed,
            unmatched_ignores: self
                .exclusions
                .unmatched_ignores()
                .map(|s| s.to_owned())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;
    use proptest::{collection::vec, prelude::*};
    use rand::{RngCore, SeedableRng, rngs::StdRng};
    use test_case::test_case;
    use test_strategy::proptest;

    /// A random source that always produces zeroes, so every index draw is 0.
    struct ZeroRng;

    impl RngCore for ZeroRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(0);
        }
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    fn excluded(set: &ExclusionSet) -> BTreeSet<&str> {
        set.iter().map(|(name, _)| name).collect()
    }

    #[test_case(SamplingPolicy::WithReplacement ; "with replacement")]
    #[test_case(SamplingPolicy::WithoutReplacement ; "without replacement")]
    fn fixed_only(policy: SamplingPolicy) {
        let all = names(&["a", "b", "c", "d", "e"]);
        let fixed = btreeset! { "b".to_owned(), "d".to_owned() };
        let set = select_exclusions(&all, &fixed, 0, policy, &mut StdRng::seed_from_u64(0))
            .expect("no random exclusions requested");

        assert_eq!(excluded(&set), btreeset! { "b", "d" });
        assert_eq!(set.reason("b"), Some(ExclusionReason::FixedIgnore));
        assert_eq!(set.reason("a"), None);
        assert_eq!(set.unmatched_ignores().len(), 0);
    }

    #[test_case(SamplingPolicy::WithReplacement ; "with replacement")]
    #[test_case(SamplingPolicy::WithoutReplacement ; "without replacement")]
    fn no_candidates_left(policy: SamplingPolicy) {
        let all = names(&["a", "b", "c"]);
        let fixed = btreeset! { "a".to_owned(), "b".to_owned(), "c".to_owned() };
        let err = select_exclusions(&all, &fixed, 1, policy, &mut StdRng::seed_from_u64(0))
            .expect_err("no candidates to draw from");

        assert_eq!(
            err,
            SelectionError::InvalidSampleRange {
                candidates: 0,
                requested: 1,
                policy,
            }
        );
    }

    #[test]
    fn no_candidates_and_nothing_requested() {
        let all = names(&["a"]);
        let fixed = btreeset! { "a".to_owned() };
        let set = select_exclusions(
            &all,
            &fixed,
            0,
            SamplingPolicy::WithoutReplacement,
            &mut StdRng::seed_from_u64(0),
        )
        .expect("drawing nothing from nothing is fine");
        assert_eq!(excluded(&set), btreeset! { "a" });
    }

    #[test]
    fn duplicate_draws_collapse() {
        let all = names(&["a", "b", "c", "d"]);
        let candidates = candidates(&all, &BTreeSet::new());
        let set = exclusions_from_draws(&all, &BTreeSet::new(), &candidates, &[0, 0]);

        assert_eq!(excluded(&set), btreeset! { "a" });
        assert_eq!(set.reason("a"), Some(ExclusionReason::Random));
    }

    #[test]
    fn with_replacement_zero_rng() {
        let all = names(&["a", "b", "c", "d"]);
        let set = select_exclusions(
            &all,
            &BTreeSet::new(),
            2,
            SamplingPolicy::WithReplacement,
            &mut ZeroRng,
        )
        .expect("4 candidates available");

        assert_eq!(excluded(&set), btreeset! { "a" });
    }

    #[test]
    fn without_replacement_rejects_oversized_draw() {
        let all = names(&["a", "b", "c"]);
        let fixed = btreeset! { "a".to_owned() };
        let err = select_exclusions(
            &all,
            &fixed,
            3,
            SamplingPolicy::WithoutReplacement,
            &mut StdRng::seed_from_u64(0),
        )
        .expect_err("only 2 candidates");
        assert_eq!(
            err,
            SelectionError::InvalidSampleRange {
                candidates: 2,
                requested: 3,
                policy: SamplingPolicy::WithoutReplacement,
            }
        );

        // With replacement, drawing more than the number of candidates is allowed.
        let set = select_exclusions(
            &all,
            &fixed,
            3,
            SamplingPolicy::WithReplacement,
            &mut StdRng::seed_from_u64(0),
        )
        .expect("draws may repeat");
        assert!(set.len() <= 3);
    }

    #[test]
    fn unmatched_ignores_are_kept_aside() {
        let all = names(&["a", "b"]);
        let fixed = btreeset! { "b".to_owned(), "missing.ipynb".to_owned() };
        let set = select_exclusions(
            &all,
            &fixed,
            1,
            SamplingPolicy::WithoutReplacement,
            &mut StdRng::seed_from_u64(7),
        )
        .expect("one candidate left");

        assert_eq!(excluded(&set), btreeset! { "a", "b" });
        assert_eq!(set.reason("a"), Some(ExclusionReason::Random));
        assert_eq!(
            set.unmatched_ignores().collect::<Vec<_>>(),
            vec!["missing.ipynb"]
        );
    }

    #[test]
    fn same_seed_same_selection() {
        let all: Vec<_> = (0..50).map(|i| format!("{i:02}.ipynb")).collect();
        let fixed = btreeset! { "07.ipynb".to_owned() };
        let select = |seed| {
            select_exclusions(
                &all,
                &fixed,
                5,
                SamplingPolicy::WithoutReplacement,
                &mut StdRng::seed_from_u64(seed),
            )
            .expect("enough candidates")
        };
        assert_eq!(select(1234), select(1234));
    }

    fn notebooks_strategy() -> impl Strategy<Value = Vec<String>> {
        vec("[a-z]{1,8}", 1..24).prop_map(|mut names| {
            names.sort();
            names.dedup();
            names
        })
    }

    #[proptest]
    fn selection_invariants(
        #[strategy(notebooks_strategy())] all: Vec<String>,
        #[strategy(vec("[a-z]{1,8}", 0..8))] ignore: Vec<String>,
        #[strategy(0usize..8)] n: usize,
        seed: u64,
        with_replacement: bool,
    ) {
        let fixed: BTreeSet<String> = ignore.into_iter().collect();
        let policy = if with_replacement {
            SamplingPolicy::WithReplacement
        } else {
            SamplingPolicy::WithoutReplacement
        };
        let candidate_count = candidates(&all, &fixed).len();

        match select_exclusions(&all, &fixed, n, policy, &mut StdRng::seed_from_u64(seed)) {
            Ok(set) => {
                // Every excluded notebook was discovered.
                for (name, _) in set.iter() {
                    prop_assert!(all.iter().any(|nb| nb == name));
                }
                // Fixed exclusions are never dropped.
                for name in all.iter().filter(|name| fixed.contains(*name)) {
                    prop_assert_eq!(set.reason(name), Some(ExclusionReason::FixedIgnore));
                }
                prop_assert!(set.len() <= fixed.len() + n);
                if policy == SamplingPolicy::WithoutReplacement {
                    let fixed_matched = all.iter().filter(|name| fixed.contains(*name)).count();
                    prop_assert_eq!(set.len(), fixed_matched + n);
                }
            }
            Err(SelectionError::InvalidSampleRange { candidates, requested, .. }) => {
                prop_assert_eq!(candidates, candidate_count);
                prop_assert_eq!(requested, n);
                prop_assert!(n > 0);
                match policy {
                    SamplingPolicy::WithReplacement => prop_assert_eq!(candidate_count, 0),
                    SamplingPolicy::WithoutReplacement => prop_assert!(n > candidate_count),
                }
            }
        }
    }

    #[proptest]
    fn candidate_filter_is_idempotent(
        #[strategy(notebooks_strategy())] all: Vec<String>,
        #[strategy(vec("[a-z]{1,8}", 0..8))] ignore: Vec<String>,
    ) {
        let fixed: BTreeSet<String> = ignore.into_iter().collect();
        let once = candidates(&all, &fixed);
        let twice = candidates(&once, &fixed);
        prop_assert_eq!(&once, &twice);
    }

    fn discovered(ids: &[&str]) -> DiscoveredNotebooks {
        let notebooks = ids
            .iter()
            .map(|id| crate::discovery::DiscoveredNotebook {
                id: (*id).to_owned(),
                path: format!("/nb/{id}").into(),
            })
            .collect();
        DiscoveredNotebooks::new("/nb", notebooks)
    }

    #[test]
    fn config_select_with_seed() {
        let discovered = discovered(&[
            "1-intro.ipynb",
            "2-mag.ipynb",
            "3-grav.ipynb",
            "5-DC_inversion_3D.ipynb",
        ]);
        let config = SelectionConfig {
            fixed_ignore: btreeset! {
                "5-DC_inversion_3D.ipynb".to_owned(),
                "8-IP_inversion_3D.ipynb".to_owned(),
            },
            random_exclusions: 1,
            sampling: SamplingPolicy::WithoutReplacement,
            seed: Some(42),
        };

        let selection = config.select(&discovered).expect("3 candidates");
        assert_eq!(selection.seed(), 42);
        assert_eq!(selection.exclusions().len(), 2);
        assert_eq!(
            selection.exclusions().reason("5-DC_inversion_3D.ipynb"),
            Some(ExclusionReason::FixedIgnore)
        );
        assert_eq!(selection, config.select(&discovered).expect("3 candidates"));

        let summary = selection.to_summary();
        assert_eq!(summary.seed, 42);
        assert_eq!(summary.random_exclusions, 1);
        assert_eq!(summary.sampling, SamplingPolicySummary::WithoutReplacement);
        assert_eq!(summary.unmatched_ignores, vec!["8-IP_inversion_3D.ipynb"]);
    }

    #[test]
    fn config_select_generates_seed() {
        let discovered = discovered(&["a.ipynb", "b.ipynb", "c.ipynb"]);
        let config = SelectionConfig {
            random_exclusions: 2,
            ..Default::default()
        };

        let selection = config.select(&discovered).expect("3 candidates");
        assert_eq!(selection.exclusions().len(), 2);

        // The generated seed reproduces the selection.
        let replay = SelectionConfig {
            seed: Some(selection.seed()),
            ..config
        };
        assert_eq!(
            replay.select(&discovered).expect("3 candidates"),
            selection
        );
    }
}
