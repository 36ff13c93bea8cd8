// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Pareto-dominance filter over (error, disparity) pairs
//!
//! A candidate survives when no other candidate reaches strictly lower error
//! at the same or lower disparity. Survivors are named after their position in
//! the original sweep, so `census_gs_model_7` always refers to the eighth grid
//! point no matter how many points before it were dropped.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One evaluated predictor from a mitigation sweep
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate<P> {
    /// Identifier or model handle carried through to the output
    pub handle: P,
    /// Error rate on the evaluation split (lower is better)
    pub error: f64,
    /// Disparity under the chosen fairness constraint (lower is better)
    pub disparity: f64,
}

impl<P> Candidate<P> {
    pub fn new(handle: P, error: f64, disparity: f64) -> Self {
        Self {
            handle,
            error,
            disparity,
        }
    }
}

/// Naming scheme for retained candidates: `<prefix>_<original index>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameFormat {
    pub prefix: String,
}

impl NameFormat {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn name(&self, index: usize) -> String {
        format!("{}_{}", self.prefix, index)
    }
}

impl Default for NameFormat {
    fn default() -> Self {
        Self::new("census_gs_model")
    }
}

/// Ordered mapping of synthetic model name to model handle
///
/// Iteration order is the order of the original candidate sequence restricted
/// to the retained candidates. Names are unique. Serializes as a JSON object
/// in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct DominantModels<P> {
    entries: Vec<(String, P)>,
}

impl<P> DominantModels<P> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&P> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, handle)| handle)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &P)> {
        self.entries.iter().map(|(n, h)| (n.as_str(), h))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn handles(&self) -> impl Iterator<Item = &P> {
        self.entries.iter().map(|(_, h)| h)
    }

    /// Swap the handle type while keeping names and order
    pub fn map<Q>(self, mut f: impl FnMut(&str, P) -> Q) -> DominantModels<Q> {
        DominantModels {
            entries: self
                .entries
                .into_iter()
                .map(|(name, handle)| {
                    let mapped = f(&name, handle);
                    (name, mapped)
                })
                .collect(),
        }
    }

    /// Like [`DominantModels::map`], stopping at the first error
    pub fn try_map<Q, E>(
        self,
        mut f: impl FnMut(&str, P) -> Result<Q, E>,
    ) -> Result<DominantModels<Q>, E> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (name, handle) in self.entries {
            let mapped = f(&name, handle)?;
            entries.push((name, mapped));
        }
        Ok(DominantModels { entries })
    }

    pub fn into_inner(self) -> Vec<(String, P)> {
        self.entries
    }
}

impl<P> Default for DominantModels<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<P: Serialize> Serialize for DominantModels<P> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, handle) in &self.entries {
            map.serialize_entry(name, handle)?;
        }
        map.end()
    }
}

impl<P> IntoIterator for DominantModels<P> {
    type Item = (String, P);
    type IntoIter = std::vec::IntoIter<(String, P)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Minimum error among candidates whose disparity does not exceed `disparity`
pub fn min_error_up_to<P>(candidates: &[Candidate<P>], disparity: f64) -> Option<f64> {
    candidates
        .iter()
        .filter(|c| c.disparity <= disparity)
        .map(|c| c.error)
        .reduce(f64::min)
}

/// Whether the candidate at `index` survives the filter
pub fn is_dominant<P>(candidates: &[Candidate<P>], index: usize) -> bool {
    let Some(candidate) = candidates.get(index) else {
        return false;
    };
    match min_error_up_to(candidates, candidate.disparity) {
        Some(threshold) => candidate.error <= threshold,
        None => false,
    }
}

/// First candidate with disparity <= and error < the one at `index`
pub fn dominated_by<P>(candidates: &[Candidate<P>], index: usize) -> Option<usize> {
    let candidate = candidates.get(index)?;
    candidates
        .iter()
        .position(|b| b.disparity <= candidate.disparity && b.error < candidate.error)
}

/// Select the Pareto-dominant candidates using the default name format
pub fn select_dominant<P: Clone>(candidates: &[Candidate<P>]) -> DominantModels<P> {
    select_dominant_with(candidates, &NameFormat::default())
}

/// Select the Pareto-dominant candidates
///
/// Candidate A is kept iff `error(A) <= min(error(B))` over all B with
/// `disparity(B) <= disparity(A)`. Ties at the minimum are all kept. The
/// global minimum-error candidate is always kept, so the result is non-empty
/// for non-empty input.
pub fn select_dominant_with<P: Clone>(
    candidates: &[Candidate<P>],
    format: &NameFormat,
) -> DominantModels<P> {
    let entries: Vec<(String, P)> = (0..candidates.len())
        .filter(|&i| is_dominant(candidates, i))
        .map(|i| (format.name(i), candidates[i].handle.clone()))
        .collect();

    tracing::debug!(
        "Dominance filter kept {} of {} candidates",
        entries.len(),
        candidates.len()
    );

    DominantModels { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn triples(raw: &[(&'static str, f64, f64)]) -> Vec<Candidate<&'static str>> {
        raw.iter().map(|&(id, e, d)| Candidate::new(id, e, d)).collect()
    }

    fn kept_handles<P: Clone>(selected: &DominantModels<P>) -> Vec<P> {
        selected.handles().cloned().collect()
    }

    #[test]
    fn test_same_disparity_lower_error_wins() {
        let candidates = triples(&[("a", 0.20, 0.30), ("b", 0.15, 0.30), ("c", 0.10, 0.50)]);
        let selected = select_dominant(&candidates);

        assert_eq!(kept_handles(&selected), vec!["b", "c"]);
        assert_eq!(selected.names().collect::<Vec<_>>(), vec!["census_gs_model_1", "census_gs_model_2"]);
    }

    #[test]
    fn test_all_identical_retained() {
        let candidates: Vec<_> = (0..5).map(|i| Candidate::new(i, 0.2, 0.1)).collect();
        let selected = select_dominant(&candidates);

        assert_eq!(selected.len(), 5);
        assert_eq!(kept_handles(&selected), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_single_candidate() {
        let candidates = triples(&[("only", 0.42, 0.07)]);
        let selected = select_dominant(&candidates);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected.get("census_gs_model_0"), Some(&"only"));
    }

    #[test]
    fn test_clean_front_all_retained() {
        // Lower disparity always costs more error
        let candidates = triples(&[("a", 0.10, 0.40), ("b", 0.12, 0.30), ("c", 0.15, 0.20), ("d", 0.19, 0.05)]);
        let selected = select_dominant(&candidates);

        assert_eq!(kept_handles(&selected), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_decreasing_disparity_and_error() {
        // Each point is beaten by a later one with both lower error and lower disparity
        let candidates = triples(&[("a", 0.30, 0.50), ("b", 0.20, 0.40), ("c", 0.10, 0.30)]);
        let selected = select_dominant(&candidates);

        assert_eq!(kept_handles(&selected), vec!["c"]);
        assert_eq!(dominated_by(&candidates, 0), Some(1));
        assert_eq!(dominated_by(&candidates, 1), Some(2));
        assert_eq!(dominated_by(&candidates, 2), None);
    }

    #[test]
    fn test_decreasing_disparity_increasing_error() {
        let candidates = triples(&[("a", 0.1, 0.5), ("b", 0.2, 0.4), ("c", 0.3, 0.3)]);
        let selected = select_dominant(&candidates);

        assert_eq!(kept_handles(&selected), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_names_follow_original_index() {
        let candidates = triples(&[("a", 0.5, 0.1), ("b", 0.6, 0.2), ("c", 0.4, 0.3), ("d", 0.9, 0.9)]);
        let selected = select_dominant_with(&candidates, &NameFormat::new("grid"));

        assert_eq!(selected.names().collect::<Vec<_>>(), vec!["grid_0", "grid_2"]);
    }

    #[test]
    fn test_tie_at_minimum_retains_both() {
        let candidates = triples(&[("a", 0.2, 0.3), ("b", 0.2, 0.3), ("c", 0.25, 0.3)]);
        let selected = select_dominant(&candidates);

        assert_eq!(kept_handles(&selected), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_input() {
        let candidates: Vec<Candidate<u32>> = Vec::new();
        assert!(select_dominant(&candidates).is_empty());
    }

    #[test]
    fn test_nan_does_not_panic() {
        let candidates = vec![Candidate::new(0, f64::NAN, 0.1), Candidate::new(1, 0.2, f64::NAN), Candidate::new(2, 0.3, 0.2)];
        let selected = select_dominant(&candidates);
        assert!(selected.len() <= 3);
    }

    #[test]
    fn test_map_keeps_names_and_order() {
        let candidates = triples(&[("a", 0.1, 0.5), ("b", 0.2, 0.4)]);
        let mapped = select_dominant(&candidates).map(|name, id| format!("{name}->{id}"));

        let values: Vec<_> = mapped.handles().cloned().collect();
        assert_eq!(values, vec!["census_gs_model_0->a", "census_gs_model_1->b"]);
    }

    #[test]
    fn test_try_map_short_circuits() {
        let candidates = triples(&[("a", 0.1, 0.5), ("b", 0.2, 0.4)]);
        let result: Result<DominantModels<usize>, String> =
            select_dominant(&candidates).try_map(|_, id| if id == "b" { Err("boom".to_string()) } else { Ok(1) });

        assert_eq!(result.unwrap_err(), "boom");
    }

    #[test]
    fn test_serializes_as_ordered_object() {
        let candidates = triples(&[("z", 0.1, 0.5), ("a", 0.2, 0.4)]);
        let json = serde_json::to_string(&select_dominant_with(&candidates, &NameFormat::new("m"))).unwrap();

        assert_eq!(json, r#"{"m_0":"z","m_1":"a"}"#);
    }

    fn arb_candidates() -> impl Strategy<Value = Vec<Candidate<usize>>> {
        // Coarse grid so ties on both axes show up often
        proptest::collection::vec((0u8..20, 0u8..20), 1..40).prop_map(|points| {
            points
                .into_iter()
                .enumerate()
                .map(|(i, (e, d))| Candidate::new(i, e as f64 / 20.0, d as f64 / 20.0))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_global_minimum_retained(candidates in arb_candidates()) {
            let selected = select_dominant(&candidates);
            let best = candidates.iter().map(|c| c.error).fold(f64::INFINITY, f64::min);

            prop_assert!(!selected.is_empty());
            prop_assert!(selected.handles().any(|&i| candidates[i].error == best));
        }

        #[test]
        fn prop_retained_not_dominated(candidates in arb_candidates()) {
            let selected = select_dominant(&candidates);
            for &i in selected.handles() {
                let a = &candidates[i];
                prop_assert!(!candidates.iter().any(|b| b.disparity <= a.disparity && b.error < a.error));
            }
        }

        #[test]
        fn prop_dropped_has_witness(candidates in arb_candidates()) {
            let selected = select_dominant(&candidates);
            let kept: Vec<usize> = selected.handles().copied().collect();
            for i in 0..candidates.len() {
                if !kept.contains(&i) {
                    let witness = dominated_by(&candidates, i);
                    prop_assert!(witness.is_some());
                }
            }
        }

        #[test]
        fn prop_idempotent(candidates in arb_candidates()) {
            prop_assert_eq!(select_dominant(&candidates), select_dominant(&candidates));
        }

        #[test]
        fn prop_order_preserved(candidates in arb_candidates()) {
            let kept: Vec<usize> = select_dominant(&candidates).handles().copied().collect();
            prop_assert!(kept.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
