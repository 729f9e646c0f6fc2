//! # Mutual Information Estimation for Continuous Samples
//!
//! Two estimation strategies behind one value type: Parzen kernel-window
//! density estimation, and adaptive recursive partitioning of the rank
//! space. The strategy is fixed at construction time; callers depend only
//! on [`MutualInformation::estimate`].
//!
//! An estimator is built once from a fixed sample and then scores other
//! samples against it. Estimates are symmetric in the two samples up to
//! estimator-specific numerical noise, and never negative.

use ndarray::ArrayView1;

/// Strategy selector, fixed for a whole run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MiStrategy {
    /// Kernel-window density estimation with the given number of windows
    /// across each variable's range. Few windows suit few cases (around 5);
    /// many windows suit very large samples (around 15).
    Parzen { windows: usize },
    /// Adaptive recursive partitioning of the joint rank space. A cell is
    /// subdivided while its quadrant chi-square statistic exceeds `chi`
    /// (reference value 6.0) and it holds more than `min_points` points.
    Adaptive { min_points: usize, chi: f64 },
}

/// A mutual information estimator constructed over one fixed sample.
pub struct MutualInformation {
    kind: Kind,
}

enum Kind {
    Parzen(ParzenWindows),
    Adaptive(AdaptivePartition),
}

impl MutualInformation {
    pub fn new(sample: ArrayView1<f64>, strategy: MiStrategy) -> Self {
        let kind = match strategy {
            MiStrategy::Parzen { windows } => Kind::Parzen(ParzenWindows {
                scaled: unit_scale(sample),
                sigma: 1.0 / windows.max(1) as f64,
            }),
            MiStrategy::Adaptive { min_points, chi } => Kind::Adaptive(AdaptivePartition {
                ranks: ranks(sample),
                min_points,
                chi,
            }),
        };
        Self { kind }
    }

    /// Mutual information between the construction sample and `candidate`,
    /// in nats. `candidate` must have the same length as the construction
    /// sample.
    pub fn estimate(&self, candidate: ArrayView1<f64>) -> f64 {
        match &self.kind {
            Kind::Parzen(parzen) => parzen.estimate(candidate),
            Kind::Adaptive(adaptive) => adaptive.estimate(candidate),
        }
    }
}

/// Fraction of duplicated values in a sample (adjacent equality after
/// sorting). More than a few ties seriously degrade the adaptive
/// partitioning estimator, so the driver warns when this exceeds 5%.
pub fn tie_fraction(sample: ArrayView1<f64>) -> f64 {
    if sample.len() < 2 {
        return 0.0;
    }
    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let ties = sorted.windows(2).filter(|w| w[0] == w[1]).count();
    ties as f64 / sample.len() as f64
}

/// Maps a sample onto the unit interval. A constant sample collapses to the
/// midpoint.
fn unit_scale(sample: ArrayView1<f64>) -> Vec<f64> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in sample {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    let span = hi - lo;
    if span <= 0.0 {
        return vec![0.5; sample.len()];
    }
    sample.iter().map(|&v| (v - lo) / span).collect()
}

/// Zero-based ranks of a sample. Tied values receive distinct ranks in an
/// arbitrary order, which is exactly why heavy ties degrade the adaptive
/// estimator.
fn ranks(sample: ArrayView1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..sample.len()).collect();
    order.sort_by(|&a, &b| sample[a].total_cmp(&sample[b]));
    let mut ranks = vec![0usize; sample.len()];
    for (rank, &i) in order.iter().enumerate() {
        ranks[i] = rank;
    }
    ranks
}

/// Parzen-window estimator: Gaussian product kernels over unit-scaled
/// samples. With unnormalized kernels the normalization constants cancel,
/// leaving
///
/// `MI = mean_i ln( n * sum_k KxKy / (sum_k Kx * sum_k Ky) )`.
struct ParzenWindows {
    scaled: Vec<f64>,
    sigma: f64,
}

impl ParzenWindows {
    fn estimate(&self, candidate: ArrayView1<f64>) -> f64 {
        let n = self.scaled.len();
        debug_assert_eq!(candidate.len(), n);
        let x = unit_scale(candidate);
        let y = &self.scaled;
        let inv_two_sigma_sq = 1.0 / (2.0 * self.sigma * self.sigma);

        let mut total = 0.0;
        for i in 0..n {
            let mut sum_x = 0.0;
            let mut sum_y = 0.0;
            let mut sum_joint = 0.0;
            for k in 0..n {
                let dx = x[i] - x[k];
                let dy = y[i] - y[k];
                let kx = (-dx * dx * inv_two_sigma_sq).exp();
                let ky = (-dy * dy * inv_two_sigma_sq).exp();
                sum_x += kx;
                sum_y += ky;
                sum_joint += kx * ky;
            }
            // The k == i term makes every sum at least one, so the ratio is
            // always positive.
            total += (n as f64 * sum_joint / (sum_x * sum_y)).ln();
        }
        (total / n as f64).max(0.0)
    }
}

/// Adaptive-partitioning estimator over the joint rank space. Because the
/// ranks of each variable are a permutation of 0..n, the marginal count of
/// any rank interval equals its width, so a terminal cell holding `n_c` of
/// the `n` points over a `wx` by `wy` rectangle contributes
///
/// `(n_c/n) * ln( n_c * n / (wx * wy) )`.
struct AdaptivePartition {
    ranks: Vec<usize>,
    min_points: usize,
    chi: f64,
}

impl AdaptivePartition {
    fn estimate(&self, candidate: ArrayView1<f64>) -> f64 {
        let n = self.ranks.len();
        debug_assert_eq!(candidate.len(), n);
        let candidate_ranks = ranks(candidate);
        let points: Vec<(usize, usize)> = candidate_ranks
            .into_iter()
            .zip(self.ranks.iter().copied())
            .collect();
        self.cell_information(&points, 0, n, 0, n, n as f64).max(0.0)
    }

    /// Information carried by one cell of the partition, recursing while
    /// the cell looks non-uniform. Ranges are half-open.
    fn cell_information(
        &self,
        points: &[(usize, usize)],
        x0: usize,
        x1: usize,
        y0: usize,
        y1: usize,
        n_total: f64,
    ) -> f64 {
        let count = points.len();
        if count == 0 {
            return 0.0;
        }
        let width_x = x1 - x0;
        let width_y = y1 - y0;
        let n_cell = count as f64;
        let contribution =
            n_cell / n_total * (n_cell * n_total / ((width_x * width_y) as f64)).ln();

        if width_x < 2 || width_y < 2 || count <= self.min_points {
            return contribution;
        }

        let x_mid = x0 + width_x / 2;
        let y_mid = y0 + width_y / 2;
        let mut quadrants: [Vec<(usize, usize)>; 4] = Default::default();
        for &(px, py) in points {
            let which = (px >= x_mid) as usize + 2 * ((py >= y_mid) as usize);
            quadrants[which].push((px, py));
        }

        let expected = n_cell / 4.0;
        let statistic: f64 = quadrants
            .iter()
            .map(|q| {
                let diff = q.len() as f64 - expected;
                diff * diff / expected
            })
            .sum();
        if statistic <= self.chi {
            return contribution;
        }

        self.cell_information(&quadrants[0], x0, x_mid, y0, y_mid, n_total)
            + self.cell_information(&quadrants[1], x_mid, x1, y0, y_mid, n_total)
            + self.cell_information(&quadrants[2], x0, x_mid, y_mid, y1, n_total)
            + self.cell_information(&quadrants[3], x_mid, x1, y_mid, y1, n_total)
    }
}
