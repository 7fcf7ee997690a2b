//! Kalman state estimation.
//!
//! A linear Kalman filter over a dimension-polymorphic state vector:
//! 6 states (position + velocity) for the constant-velocity model, 9 states
//! (+ acceleration) for the constant-acceleration model. Measurements are
//! Cartesian positions; `H` projects onto the leading three components and
//! `R = I₃`.
//!
//! The covariance update uses the Joseph form to preserve symmetry and
//! positive-definiteness over long runs, and the innovation covariance is
//! inverted through a Cholesky factorization so a degenerate update is
//! reported instead of corrupting the state.

use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Motion model selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterModel {
    /// 6-state [x, y, z, vx, vy, vz]
    ConstantVelocity,
    /// 9-state, augmented with [ax, ay, az]
    ConstantAcceleration,
}

impl FilterModel {
    /// Dimension of the state vector for this model.
    pub fn state_dim(&self) -> usize {
        match self {
            Self::ConstantVelocity => 6,
            Self::ConstantAcceleration => 9,
        }
    }
}

impl FromStr for FilterModel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CV" => Ok(Self::ConstantVelocity),
            "CA" => Ok(Self::ConstantAcceleration),
            _ => Err(ConfigError::UnknownFilterModel(s.to_string())),
        }
    }
}

impl fmt::Display for FilterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstantVelocity => write!(f, "CV"),
            Self::ConstantAcceleration => write!(f, "CA"),
        }
    }
}

/// Numerical failures during an update. Callers skip the offending update
/// and keep the filter state from the previous step.
#[derive(Debug, Clone, Error)]
pub enum FilterError {
    #[error("innovation covariance is not positive definite")]
    SingularInnovation,
}

/// One snapshot of the estimator's persistent vectors, appended to a track's
/// history after every ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterState {
    /// Filtered state vector
    pub sf: DVector<f64>,
    /// Predicted state vector
    pub sp: DVector<f64>,
    /// Filtered covariance
    pub pf: DMatrix<f64>,
    /// Predicted covariance
    pub pp: DMatrix<f64>,
}

/// Linear Kalman filter with a CV or CA motion model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalmanFilter {
    /// Selected motion model (fixes the state dimension)
    pub model: FilterModel,
    /// Filtered state vector
    pub sf: DVector<f64>,
    /// Predicted state vector
    pub sp: DVector<f64>,
    /// Filtered covariance
    pub pf: DMatrix<f64>,
    /// Predicted covariance
    pub pp: DMatrix<f64>,
    /// Measurement matrix projecting onto the position block
    pub h: DMatrix<f64>,
    /// Measurement noise covariance
    pub r: DMatrix<f64>,
    /// Plant-noise scalar driving Q
    pub plant_noise: f64,
}

impl KalmanFilter {
    pub fn new(model: FilterModel, plant_noise: f64) -> Self {
        let dim = model.state_dim();
        let mut h = DMatrix::zeros(3, dim);
        for i in 0..3 {
            h[(i, i)] = 1.0;
        }
        Self {
            model,
            sf: DVector::zeros(dim),
            sp: DVector::zeros(dim),
            pf: DMatrix::identity(dim, dim),
            pp: DMatrix::identity(dim, dim),
            h,
            r: DMatrix::identity(3, 3),
            plant_noise,
        }
    }

    /// Re-seed the filter at a known position and velocity.
    ///
    /// Used for fresh births (zero velocity) and for tentative tracks whose
    /// velocity comes from a finite difference of consecutive positions.
    /// Accelerations are zeroed for the CA model and the covariances reset
    /// to identity.
    pub fn initialize(&mut self, position: &Vector3<f64>, velocity: &Vector3<f64>) {
        let dim = self.model.state_dim();
        self.sf = DVector::zeros(dim);
        self.sf.rows_mut(0, 3).copy_from(position);
        self.sf.rows_mut(3, 3).copy_from(velocity);
        self.sp = self.sf.clone();
        self.pf = DMatrix::identity(dim, dim);
        self.pp = DMatrix::identity(dim, dim);
    }

    /// Prediction step: `Sp = Φ(dt)·Sf`, `Pp = Φ·Pf·Φᵀ + Q(dt)`.
    pub fn predict(&mut self, dt: f64) {
        let phi = self.transition(dt);
        self.sp = &phi * &self.sf;
        self.pp = &phi * &self.pf * phi.transpose() + self.process_noise(dt);
    }

    /// Update step against a Cartesian position measurement.
    ///
    /// Joseph form: `Pf = (I−KH)·Pp·(I−KH)ᵀ + K·R·Kᵀ`. A non-positive-
    /// definite innovation covariance leaves `Sf`/`Pf` untouched and returns
    /// an error for the caller to log and skip.
    pub fn update(&mut self, z: &Vector3<f64>) -> Result<(), FilterError> {
        let zv = DVector::from_column_slice(z.as_slice());
        let innovation = zv - &self.h * &self.sp;

        let s = &self.h * &self.pp * self.h.transpose() + &self.r;
        let s_inv = s.cholesky().ok_or(FilterError::SingularInnovation)?.inverse();

        let k = &self.pp * self.h.transpose() * s_inv;
        self.sf = &self.sp + &k * innovation;

        let dim = self.model.state_dim();
        let ikh = DMatrix::identity(dim, dim) - &k * &self.h;
        self.pf = &ikh * &self.pp * ikh.transpose() + &k * &self.r * k.transpose();
        Ok(())
    }

    /// Filtered position estimate.
    #[inline]
    pub fn position(&self) -> Vector3<f64> {
        Vector3::new(self.sf[0], self.sf[1], self.sf[2])
    }

    /// Filtered velocity estimate.
    #[inline]
    pub fn velocity(&self) -> Vector3<f64> {
        Vector3::new(self.sf[3], self.sf[4], self.sf[5])
    }

    /// Filtered acceleration estimate (CA model only).
    #[inline]
    pub fn acceleration(&self) -> Option<Vector3<f64>> {
        match self.model {
            FilterModel::ConstantVelocity => None,
            FilterModel::ConstantAcceleration => {
                Some(Vector3::new(self.sf[6], self.sf[7], self.sf[8]))
            }
        }
    }

    /// Inverse of the predicted position covariance `Pp[0:3, 0:3]`, used for
    /// gating. `None` when the block is singular; the track then contributes
    /// no gate edges for the current group.
    pub fn position_gate_inverse(&self) -> Option<Matrix3<f64>> {
        let block: Matrix3<f64> = self.pp.fixed_view::<3, 3>(0, 0).into_owned();
        block.try_inverse()
    }

    /// Snapshot of the persistent vectors for the track history.
    pub fn snapshot(&self) -> FilterState {
        FilterState {
            sf: self.sf.clone(),
            sp: self.sp.clone(),
            pf: self.pf.clone(),
            pp: self.pp.clone(),
        }
    }

    /// State transition matrix Φ(dt).
    fn transition(&self, dt: f64) -> DMatrix<f64> {
        let dim = self.model.state_dim();
        let mut phi = DMatrix::identity(dim, dim);
        for i in 0..3 {
            phi[(i, i + 3)] = dt;
        }
        if dim >= 9 {
            for i in 0..3 {
                phi[(i, i + 6)] = dt * dt / 2.0;
                phi[(i + 3, i + 6)] = dt;
            }
        }
        phi
    }

    /// Discrete white-noise process covariance scaled by the plant-noise
    /// scalar: piecewise-constant acceleration for CV, jerk for CA.
    fn process_noise(&self, dt: f64) -> DMatrix<f64> {
        let dim = self.model.state_dim();
        let q = self.plant_noise;
        let mut qm = DMatrix::zeros(dim, dim);
        match self.model {
            FilterModel::ConstantVelocity => {
                let q_pp = dt.powi(4) / 4.0 * q;
                let q_pv = dt.powi(3) / 2.0 * q;
                let q_vv = dt.powi(2) * q;
                for i in 0..3 {
                    qm[(i, i)] = q_pp;
                    qm[(i, i + 3)] = q_pv;
                    qm[(i + 3, i)] = q_pv;
                    qm[(i + 3, i + 3)] = q_vv;
                }
            }
            FilterModel::ConstantAcceleration => {
                let q_pp = dt.powi(5) / 20.0 * q;
                let q_pv = dt.powi(4) / 8.0 * q;
                let q_pa = dt.powi(3) / 6.0 * q;
                let q_vv = dt.powi(3) / 3.0 * q;
                let q_va = dt.powi(2) / 2.0 * q;
                let q_aa = dt * q;
                for i in 0..3 {
                    let (p, v, a) = (i, i + 3, i + 6);
                    qm[(p, p)] = q_pp;
                    qm[(p, v)] = q_pv;
                    qm[(v, p)] = q_pv;
                    qm[(p, a)] = q_pa;
                    qm[(a, p)] = q_pa;
                    qm[(v, v)] = q_vv;
                    qm[(v, a)] = q_va;
                    qm[(a, v)] = q_va;
                    qm[(a, a)] = q_aa;
                }
            }
        }
        qm
    }
}
