//! # Deferred-Factorization Least Squares
//!
//! Accumulates a fixed-shape design matrix one case at a time, factorizes it
//! exactly once, and answers any number of least-squares solves against
//! caller-supplied right-hand sides.
//!
//! Protocol: construct with the final shape, call [`Regression::add_case`]
//! exactly `ncases` times, then call [`Regression::solve`] as often as
//! desired. [`Regression::reset`] returns the engine to the empty state so
//! the storage can be reused for a new design matrix.
//!
//! The engine trusts the caller to follow the protocol. A solve issued
//! before the matrix is fully populated yields an all-zero coefficient
//! vector rather than an error; strict callers can assert
//! [`Regression::rows_added`] themselves.

use ndarray::{Array1, Array2, ArrayView1};
use ndarray_linalg::SVD;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("SVD of the design matrix failed: {0}")]
    Factorization(#[from] ndarray_linalg::error::LinalgError),
    #[error("SVD did not produce the requested factor matrices")]
    FactorsUnavailable,
}

/// Reusable singular value decomposition of the populated design matrix.
struct SvdFactors {
    u: Array2<f64>,
    s: Array1<f64>,
    vt: Array2<f64>,
}

/// Incremental least-squares solver over an `ncases` x `ncols` design
/// matrix. The factorization is the expensive step (cubic in the matrix
/// dimensions); it happens once, on the first solve, and every later solve
/// reuses it.
pub struct Regression {
    ncases: usize,
    ncols: usize,
    matrix: Array2<f64>,
    nrows: usize,
    factors: Option<SvdFactors>,
}

impl Regression {
    /// Allocates storage for an `ncases` x `ncols` design matrix in the
    /// "no rows yet, not factorized" state.
    pub fn new(ncases: usize, ncols: usize) -> Self {
        Self {
            ncases,
            ncols,
            matrix: Array2::zeros((ncases, ncols)),
            nrows: 0,
            factors: None,
        }
    }

    /// Discards accumulated rows and the factorization. Storage is retained
    /// for reuse. Idempotent.
    pub fn reset(&mut self) {
        self.nrows = 0;
        self.factors = None;
    }

    /// Appends `row` as the next case. Once `ncases` rows are present this
    /// is a no-op; a careful caller never lets that happen.
    pub fn add_case(&mut self, row: ArrayView1<f64>) {
        if self.nrows >= self.ncases {
            return;
        }
        self.matrix.row_mut(self.nrows).assign(&row);
        self.nrows += 1;
    }

    /// How many cases have been appended since construction or the last
    /// [`Regression::reset`]. Lets strict wrappers assert the population
    /// protocol without changing the solve contract.
    pub fn rows_added(&self) -> usize {
        self.nrows
    }

    /// Solves the least-squares system for one right-hand side.
    ///
    /// `threshold` is the singularity limit, typically around `1e-8`:
    /// singular values below `threshold` times the largest singular value
    /// are treated as zero and their directions dropped from the solution.
    ///
    /// If the matrix is not fully populated the returned coefficients are
    /// all zero, a warning flag for a watchful but careless caller.
    pub fn solve(
        &mut self,
        threshold: f64,
        rhs: ArrayView1<f64>,
    ) -> Result<Array1<f64>, RegressionError> {
        if self.nrows != self.ncases {
            return Ok(Array1::zeros(self.ncols));
        }
        debug_assert_eq!(rhs.len(), self.ncases);

        if self.factors.is_none() {
            let (u, s, vt) = self.matrix.svd(true, true)?;
            let (Some(u), Some(vt)) = (u, vt) else {
                return Err(RegressionError::FactorsUnavailable);
            };
            self.factors = Some(SvdFactors { u, s, vt });
        }
        let factors = self
            .factors
            .as_ref()
            .ok_or(RegressionError::FactorsUnavailable)?;

        let s_max = factors.s.iter().fold(0.0_f64, |max, &s| max.max(s));
        let cutoff = threshold * s_max;
        let mut coefficients = Array1::zeros(self.ncols);
        for (j, &s) in factors.s.iter().enumerate() {
            if s <= 0.0 || s < cutoff {
                continue;
            }
            let projection = factors.u.column(j).dot(&rhs) / s;
            coefficients.scaled_add(projection, &factors.vt.row(j));
        }
        Ok(coefficients)
    }
}
