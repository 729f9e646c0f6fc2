//! # Greedy Redundancy-Aware Forward Selection
//!
//! Chooses, from a pool of candidate variables, an ordered subset that
//! greedily maximizes incremental information about a target variable net
//! of redundancy with the variables already chosen. Every pairwise mutual
//! information between candidates is computed at most once per run; the
//! values live in a triangular memo table for the rest of the run (mutual
//! information between two fixed samples is deterministic given the
//! estimator, so the cache never needs invalidating).
//!
//! A run writes a human-readable report into a caller-supplied sink:
//! the univariate screening tables, the trial table of every search step,
//! and the final kept set.

use std::io::{self, Write};
use thiserror::Error;

use crate::data::VariableTable;
use crate::mi::{MiStrategy, MutualInformation, tie_fraction};

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Dependent variable '{0}' is not in the data file")]
    TargetNotFound(String),
    #[error("Dependent variable '{name}' must come after the first {n_indep} variables")]
    TargetInsidePrefix { name: String, n_indep: usize },
    #[error("There are no independent-variable candidates to screen")]
    NoCandidates,
    #[error("{n_indep} independent variables requested but the file has only {nvars} columns")]
    TooManyCandidates { n_indep: usize, nvars: usize },
    #[error("Failed to write the report: {0}")]
    Report(#[from] io::Error),
}

/// One member of the kept set. The recorded relevance, redundancy, and
/// criterion reflect the kept-set composition at this member's own
/// selection time; they are never recomputed as later members arrive.
#[derive(Clone, Debug)]
pub struct KeptVariable {
    pub index: usize,
    pub relevance: f64,
    pub redundancy: f64,
    pub criterion: f64,
}

/// Outcome of a selection run.
#[derive(Debug)]
pub struct Selection {
    /// Kept variables in selection order.
    pub kept: Vec<KeptVariable>,
    /// Univariate relevance of every candidate, by candidate index.
    pub univariate: Vec<f64>,
    /// Number of pairwise estimator constructions during the greedy phase,
    /// which equals the number of memo-table misses. Bounded by the number
    /// of distinct unordered candidate pairs.
    pub pair_evaluations: usize,
}

/// Symmetric pairwise cache over the upper triangle including the diagonal,
/// keyed by the canonical index `max*(max+1)/2 + min`.
struct PairCache {
    cells: Vec<Option<f64>>,
    misses: usize,
}

impl PairCache {
    fn new(n: usize) -> Self {
        Self {
            cells: vec![None; n * (n + 1) / 2],
            misses: 0,
        }
    }

    fn slot(i: usize, j: usize) -> usize {
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        hi * (hi + 1) / 2 + lo
    }

    fn get_or_insert_with<F: FnOnce() -> f64>(&mut self, i: usize, j: usize, compute: F) -> f64 {
        let slot = Self::slot(i, j);
        match self.cells[slot] {
            Some(value) => value,
            None => {
                let value = compute();
                self.cells[slot] = Some(value);
                self.misses += 1;
                value
            }
        }
    }
}

/// Forward-selection search over the candidate prefix of a variable table.
pub struct ForwardSelection<'a> {
    table: &'a VariableTable,
    n_candidates: usize,
    target: usize,
    strategy: MiStrategy,
}

impl<'a> ForwardSelection<'a> {
    /// Validates the run configuration: the target variable must exist and
    /// must lie beyond the first `n_indep` columns, which form the
    /// candidate pool.
    pub fn new(
        table: &'a VariableTable,
        n_indep: usize,
        target_name: &str,
        strategy: MiStrategy,
    ) -> Result<Self, SelectionError> {
        if n_indep == 0 {
            return Err(SelectionError::NoCandidates);
        }
        if n_indep >= table.nvars() {
            return Err(SelectionError::TooManyCandidates {
                n_indep,
                nvars: table.nvars(),
            });
        }
        let target = table
            .find_variable(target_name)
            .ok_or_else(|| SelectionError::TargetNotFound(target_name.to_string()))?;
        if target < n_indep {
            return Err(SelectionError::TargetInsidePrefix {
                name: table.name(target).to_string(),
                n_indep,
            });
        }
        Ok(Self {
            table,
            n_candidates: n_indep,
            target,
            strategy,
        })
    }

    /// Column index of the dependent variable.
    pub fn target_index(&self) -> usize {
        self.target
    }

    /// Runs the univariate screening pass and the greedy search, keeping at
    /// most `max_kept` variables, and writes the report into `report`.
    pub fn run<W: Write>(&self, max_kept: usize, report: &mut W) -> Result<Selection, SelectionError> {
        let table = self.table;
        let ncand = self.n_candidates;
        let target_name = table.name(self.target);

        match self.strategy {
            MiStrategy::Parzen { windows } => writeln!(
                report,
                "Parzen mutual information of {target_name} (windows={windows})"
            )?,
            MiStrategy::Adaptive { .. } => writeln!(
                report,
                "Adaptive partitioning mutual information of {target_name}"
            )?,
        }
        writeln!(report)?;
        writeln!(
            report,
            "---------------------------------------------------------------"
        )?;
        writeln!(report)?;

        // Univariate pass: one estimator, built from the target sample,
        // lives for the whole pass. The scores double as the relevance
        // column of the greedy phase; recomputing them there would be
        // wasteful.
        writeln!(report, "Initial candidates, in order of appearance in data file")?;
        writeln!(report)?;
        writeln!(report, "                       Variable   Information")?;
        let univariate = {
            let estimator = MutualInformation::new(table.column(self.target).view(), self.strategy);
            let mut univariate = Vec::with_capacity(ncand);
            for icand in 0..ncand {
                let info = estimator.estimate(table.column(icand).view());
                log::info!("{} = {:.5}", table.name(icand), info);
                writeln!(report, "{:>31}   {:.5}", table.name(icand), info)?;
                univariate.push(info);
            }
            univariate
        };

        writeln!(report)?;
        writeln!(
            report,
            "Initial candidates, in order of decreasing mutual information"
        )?;
        writeln!(report)?;
        writeln!(report, "                       Variable   Information")?;
        let mut order: Vec<usize> = (0..ncand).collect();
        order.sort_by(|&a, &b| univariate[b].total_cmp(&univariate[a]));
        for &icand in &order {
            writeln!(report, "{:>31}   {:.5}", table.name(icand), univariate[icand])?;
        }

        let mut cache = PairCache::new(ncand);
        let strategy = self.strategy;
        let kept = greedy_search(
            &table.names()[..ncand],
            &univariate,
            max_kept,
            |candidate, member| {
                cache.get_or_insert_with(candidate, member, || {
                    // Cache miss: a fresh estimator over the kept member's
                    // sample, scoped to this one pairwise computation.
                    let estimator = MutualInformation::new(table.column(member).view(), strategy);
                    estimator.estimate(table.column(candidate).view())
                })
            },
            report,
        )?;

        Ok(Selection {
            kept,
            univariate,
            pair_evaluations: cache.misses,
        })
    }
}

/// The greedy search loop. `pairwise` is the redundancy oracle: mutual
/// information between two candidates, memoized by the caller.
///
/// Seeding takes the candidate with the highest univariate relevance; the
/// loop then keeps committing the candidate with the strictly greatest
/// criterion (relevance minus mean redundancy against the kept set) until
/// the requested size is reached, the pool is exhausted, or no candidate
/// adds positive net information. Equal criteria keep the first-encountered
/// candidate; this first-index-wins tie-break is deliberate policy.
fn greedy_search<W: Write, F: FnMut(usize, usize) -> f64>(
    names: &[String],
    univariate: &[f64],
    max_kept: usize,
    mut pairwise: F,
    report: &mut W,
) -> io::Result<Vec<KeptVariable>> {
    let ncand = univariate.len();
    let max_kept = max_kept.min(ncand); // Guard against a silly request
    let mut kept: Vec<KeptVariable> = Vec::new();

    if max_kept > 0 {
        let mut seed = 0;
        for icand in 1..ncand {
            if univariate[icand] > univariate[seed] {
                seed = icand;
            }
        }
        kept.push(KeptVariable {
            index: seed,
            relevance: univariate[seed],
            redundancy: 0.0,
            criterion: univariate[seed],
        });
    }

    while kept.len() < max_kept {
        writeln!(report)?;
        writeln!(
            report,
            "Variables so far                 Relevance  Redundancy  Criterion"
        )?;
        for k in &kept {
            writeln!(
                report,
                "{:>31} {:>10.5} {:>10.5} {:>10.5}",
                names[k.index], k.relevance, k.redundancy, k.criterion
            )?;
        }
        writeln!(report)?;
        writeln!(report, "Searching for an additional candidate...")?;
        writeln!(report)?;
        writeln!(
            report,
            "                       Variable  Relevance  Redundancy  Criterion"
        )?;

        let mut best: Option<KeptVariable> = None;
        for icand in 0..ncand {
            if kept.iter().any(|k| k.index == icand) {
                continue;
            }
            let relevance = univariate[icand];

            let mut redundancy = 0.0;
            for k in &kept {
                let pair = pairwise(icand, k.index);
                log::debug!(
                    "{} <-> {} redundancy = {:.5}",
                    names[icand],
                    names[k.index],
                    pair
                );
                redundancy += pair;
            }
            redundancy /= kept.len() as f64;

            let criterion = relevance - redundancy;
            writeln!(
                report,
                "{:>31} {:>10.5} {:>10.5} {:>10.5}",
                names[icand], relevance, redundancy, criterion
            )?;

            if best.as_ref().is_none_or(|b| criterion > b.criterion) {
                best = Some(KeptVariable {
                    index: icand,
                    relevance,
                    redundancy,
                    criterion,
                });
            }
        }

        let Some(best) = best else {
            break;
        };
        // No remaining candidate adds positive net information: the natural
        // stopping rule, checked before the size limit.
        if best.criterion <= 0.0 {
            break;
        }
        log::info!(
            "Keeping {} (criterion {:.5})",
            names[best.index],
            best.criterion
        );
        kept.push(best);
    }

    writeln!(report)?;
    writeln!(
        report,
        "Final set                        Relevance  Redundancy  Criterion"
    )?;
    for k in &kept {
        writeln!(
            report,
            "{:>31} {:>10.5} {:>10.5} {:>10.5}",
            names[k.index], k.relevance, k.redundancy, k.criterion
        )?;
    }

    Ok(kept)
}

/// Writes the tie warnings that precede an adaptive-partitioning run: for
/// every candidate and the target, the fraction of duplicated values when
/// it exceeds 5%. Advisory only; selection logic is unaffected.
pub fn write_tie_diagnostics<W: Write>(
    table: &VariableTable,
    n_indep: usize,
    target: usize,
    report: &mut W,
) -> io::Result<()> {
    let mut flagged = 0;
    for ivar in (0..n_indep).chain([target]) {
        let fraction = tie_fraction(table.column(ivar).view());
        if fraction > 0.05 {
            flagged += 1;
            writeln!(
                report,
                "WARNING... {} has {:.2} percent ties!",
                table.name(ivar),
                100.0 * fraction
            )?;
        }
    }
    if flagged > 0 {
        writeln!(report, "The presence of ties will seriously degrade")?;
        writeln!(report, "performance of the adaptive partitioning algorithm")?;
        writeln!(report)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("V{i}")).collect()
    }

    #[test]
    fn pair_cache_slot_is_symmetric_and_distinct() {
        assert_eq!(PairCache::slot(2, 5), PairCache::slot(5, 2));
        let mut seen = std::collections::HashSet::new();
        for i in 0..6 {
            for j in i..6 {
                assert!(seen.insert(PairCache::slot(i, j)), "collision at ({i},{j})");
            }
        }
    }

    #[test]
    fn pair_cache_counts_each_pair_once() {
        let mut cache = PairCache::new(4);
        let mut computed = 0;
        for _ in 0..3 {
            cache.get_or_insert_with(1, 3, || {
                computed += 1;
                0.5
            });
            cache.get_or_insert_with(3, 1, || {
                computed += 1;
                0.5
            });
        }
        assert_eq!(computed, 1);
        assert_eq!(cache.misses, 1);
    }

    /// The worked screening example: three candidates with relevances
    /// 0.40, 0.25, 0.10 and every pairwise redundancy 0.30. After seeding
    /// with the best candidate the other criteria are -0.05 and -0.20, so
    /// the search stops with a single kept variable.
    #[test]
    fn negative_criteria_stop_the_search_after_seeding() {
        let univariate = [0.40, 0.25, 0.10];
        let mut sink = Vec::new();
        let kept = greedy_search(&names(3), &univariate, 3, |_, _| 0.30, &mut sink).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].index, 0);
        assert_abs_diff_eq!(kept[0].relevance, 0.40, epsilon = 1e-12);
        assert_abs_diff_eq!(kept[0].redundancy, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kept[0].criterion, 0.40, epsilon = 1e-12);
        let text = String::from_utf8(sink).unwrap();
        assert!(text.contains("-0.05000"));
        assert!(text.contains("-0.20000"));
    }

    #[test]
    fn zero_redundancy_keeps_candidates_in_relevance_order() {
        let univariate = [0.10, 0.40, 0.25];
        let mut sink = Vec::new();
        let kept = greedy_search(&names(3), &univariate, 3, |_, _| 0.0, &mut sink).unwrap();
        let order: Vec<usize> = kept.iter().map(|k| k.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
        // Recorded numbers reflect each member's own selection step.
        assert_abs_diff_eq!(kept[1].relevance, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(kept[1].redundancy, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(kept[2].criterion, 0.10, epsilon = 1e-12);
    }

    #[test]
    fn kept_size_is_bounded_by_max_kept() {
        let univariate = [0.5, 0.4, 0.3, 0.2];
        let mut sink = Vec::new();
        let kept = greedy_search(&names(4), &univariate, 2, |_, _| 0.0, &mut sink).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn max_kept_beyond_pool_is_clamped() {
        let univariate = [0.5, 0.4];
        let mut sink = Vec::new();
        let kept = greedy_search(&names(2), &univariate, 50, |_, _| 0.0, &mut sink).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn zero_max_kept_selects_nothing() {
        let univariate = [0.5, 0.4];
        let mut sink = Vec::new();
        let kept = greedy_search(&names(2), &univariate, 0, |_, _| 0.0, &mut sink).unwrap();
        assert!(kept.is_empty());
    }

    #[test]
    fn equal_criteria_keep_the_first_candidate() {
        // Candidates 1 and 2 tie exactly once candidate 0 is kept.
        let univariate = [0.50, 0.30, 0.30];
        let mut sink = Vec::new();
        let kept = greedy_search(&names(3), &univariate, 2, |_, _| 0.1, &mut sink).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].index, 1);
    }

    #[test]
    fn seed_tie_keeps_the_first_candidate() {
        let univariate = [0.40, 0.40, 0.10];
        let mut sink = Vec::new();
        let kept = greedy_search(&names(3), &univariate, 1, |_, _| 0.0, &mut sink).unwrap();
        assert_eq!(kept[0].index, 0);
    }

    fn toy_table() -> VariableTable {
        // Four cases, three columns; the third column is the target.
        let values = Array2::from_shape_vec(
            (4, 3),
            vec![
                1.0, 4.0, 1.5, //
                2.0, 3.0, 2.5, //
                3.0, 2.0, 3.5, //
                4.0, 1.0, 4.5,
            ],
        )
        .unwrap();
        VariableTable::new(
            vec!["A".to_string(), "B".to_string(), "Y".to_string()],
            values,
        )
        .unwrap()
    }

    #[test]
    fn validates_target_exists() {
        let table = toy_table();
        let err = ForwardSelection::new(
            &table,
            2,
            "MISSING",
            MiStrategy::Parzen { windows: 5 },
        )
        .unwrap_err();
        assert!(matches!(err, SelectionError::TargetNotFound(_)));
    }

    #[test]
    fn validates_target_beyond_candidate_prefix() {
        let table = toy_table();
        let err =
            ForwardSelection::new(&table, 2, "a", MiStrategy::Parzen { windows: 5 }).unwrap_err();
        assert!(matches!(
            err,
            SelectionError::TargetInsidePrefix { n_indep: 2, .. }
        ));
    }

    #[test]
    fn validates_candidate_pool() {
        let table = toy_table();
        assert!(matches!(
            ForwardSelection::new(&table, 0, "Y", MiStrategy::Parzen { windows: 5 }),
            Err(SelectionError::NoCandidates)
        ));
        assert!(matches!(
            ForwardSelection::new(&table, 3, "Y", MiStrategy::Parzen { windows: 5 }),
            Err(SelectionError::TooManyCandidates { n_indep: 3, nvars: 3 })
        ));
    }

    #[test]
    fn target_lookup_is_case_insensitive() {
        let table = toy_table();
        let selector =
            ForwardSelection::new(&table, 2, "y", MiStrategy::Parzen { windows: 5 }).unwrap();
        assert_eq!(selector.target_index(), 2);
    }

    #[test]
    fn pairwise_evaluations_never_exceed_distinct_pairs() {
        let table = toy_table();
        let selector =
            ForwardSelection::new(&table, 2, "Y", MiStrategy::Parzen { windows: 5 }).unwrap();
        let mut sink = Vec::new();
        let selection = selector.run(2, &mut sink).unwrap();
        // Two candidates: at most one distinct unordered pair off the
        // diagonal, touched at most once.
        assert!(selection.pair_evaluations <= 1);
        assert!(selection.kept.len() <= 2);
        assert_eq!(selection.univariate.len(), 2);
    }

    #[test]
    fn tie_diagnostics_flag_heavy_ties() {
        let values = Array2::from_shape_vec(
            (6, 2),
            vec![
                1.0, 1.0, //
                1.0, 2.0, //
                1.0, 3.0, //
                2.0, 4.0, //
                3.0, 5.0, //
                4.0, 6.0,
            ],
        )
        .unwrap();
        let table = VariableTable::new(vec!["T".to_string(), "Y".to_string()], values).unwrap();
        let mut sink = Vec::new();
        write_tie_diagnostics(&table, 1, 1, &mut sink).unwrap();
        let text = String::from_utf8(sink).unwrap();
        assert!(text.contains("WARNING... T has 33.33 percent ties!"));
        assert!(!text.contains("WARNING... Y"));
        assert!(text.contains("adaptive partitioning"));
    }

    #[test]
    fn tie_diagnostics_stay_silent_without_ties() {
        let table = toy_table();
        let mut sink = Vec::new();
        write_tie_diagnostics(&table, 2, 2, &mut sink).unwrap();
        assert!(sink.is_empty());
    }
}
