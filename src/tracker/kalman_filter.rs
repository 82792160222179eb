//! Constant-velocity Kalman filter over the XYSR box space.
//!
//! State is `[cx, cy, s, r, vcx, vcy, vs]`: box center, area, aspect ratio and
//! the velocities of center and area. The aspect ratio is modelled as constant.

use ndarray::{Array1, Array2};

const STATE_DIM: usize = 7;
const MEASUREMENT_DIM: usize = 4;

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    motion_mat: Array2<f64>,
    update_mat: Array2<f64>,
    measurement_noise: Array2<f64>,
    process_noise: Array2<f64>,
    initial_covariance: Array2<f64>,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    pub fn new() -> Self {
        let mut motion_mat = Array2::eye(STATE_DIM);
        for i in 0..3 {
            motion_mat[[i, MEASUREMENT_DIM + i]] = 1.0;
        }

        let mut update_mat = Array2::zeros((MEASUREMENT_DIM, STATE_DIM));
        for i in 0..MEASUREMENT_DIM {
            update_mat[[i, i]] = 1.0;
        }

        // Scale and ratio observations are much noisier than the center.
        let measurement_noise = Array2::from_diag(&Array1::from_vec(vec![1.0, 1.0, 10.0, 10.0]));

        let process_noise = Array2::from_diag(&Array1::from_vec(vec![
            1.0, 1.0, 1.0, 1.0, 1e-2, 1e-2, 1e-4,
        ]));

        // Velocities are unobserved at birth, so start with high uncertainty.
        let initial_covariance = Array2::from_diag(&Array1::from_vec(vec![
            10.0, 10.0, 10.0, 10.0, 1e4, 1e4, 1e4,
        ]));

        Self {
            motion_mat,
            update_mat,
            measurement_noise,
            process_noise,
            initial_covariance,
        }
    }

    pub fn initiate(&self, measurement: [f64; 4]) -> (Array1<f64>, Array2<f64>) {
        let mut mean = Array1::zeros(STATE_DIM);
        for i in 0..MEASUREMENT_DIM {
            mean[i] = measurement[i];
        }

        (mean, self.initial_covariance.clone())
    }

    pub fn predict(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let mut mean = mean.clone();
        // Area must not shrink below zero.
        if mean[2] + mean[6] <= 0.0 {
            mean[6] = 0.0;
        }

        let new_mean = self.motion_mat.dot(&mean);
        let new_covariance =
            self.motion_mat.dot(covariance).dot(&self.motion_mat.t()) + &self.process_noise;

        (new_mean, new_covariance)
    }

    pub fn project(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
    ) -> (Array1<f64>, Array2<f64>) {
        let mean_proj = self.update_mat.dot(mean);
        let covariance_proj = self.update_mat.dot(covariance).dot(&self.update_mat.t())
            + &self.measurement_noise;

        (mean_proj, covariance_proj)
    }

    /// Correct the state with an observed box.
    ///
    /// Returns `None` if the innovation covariance is singular; callers keep
    /// the predicted state in that case.
    pub fn update(
        &self,
        mean: &Array1<f64>,
        covariance: &Array2<f64>,
        measurement: [f64; 4],
    ) -> Option<(Array1<f64>, Array2<f64>)> {
        let (projected_mean, projected_cov) = self.project(mean, covariance);

        let measurement_arr = Array1::from_vec(measurement.to_vec());
        let innovation = measurement_arr - projected_mean;

        // K = P * H^T * S^-1
        let s_inv = invert_4x4(&projected_cov)?;

        let pht = covariance.dot(&self.update_mat.t()); // 7x4
        let kalman_gain = pht.dot(&s_inv); // 7x4

        let new_mean = mean + &kalman_gain.dot(&innovation);
        let new_covariance = covariance - &kalman_gain.dot(&projected_cov).dot(&kalman_gain.t());

        Some((new_mean, new_covariance))
    }
}

/// Invert a 4x4 matrix using nalgebra (pure Rust, no BLAS/LAPACK).
fn invert_4x4(m: &Array2<f64>) -> Option<Array2<f64>> {
    let mut nm = nalgebra::Matrix4::zeros();
    for i in 0..4 {
        for j in 0..4 {
            nm[(i, j)] = m[[i, j]];
        }
    }
    let inv = nm.try_inverse()?;
    let mut res = Array2::zeros((4, 4));
    for i in 0..4 {
        for j in 0..4 {
            res[[i, j]] = inv[(i, j)];
        }
    }
    Some(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([150.0, 150.0, 10_000.0, 1.0]);
        assert_eq!(mean.len(), 7);
        assert_eq!(mean[0], 150.0);
        assert_eq!(mean[6], 0.0);
        assert_eq!(cov[[4, 4]], 1e4);
    }

    #[test]
    fn test_predict_without_velocity_keeps_position() {
        let kf = KalmanFilter::new();
        let (mean, cov) = kf.initiate([150.0, 150.0, 10_000.0, 1.0]);
        let (predicted, predicted_cov) = kf.predict(&mean, &cov);
        assert_eq!(predicted[0], 150.0);
        assert_eq!(predicted[2], 10_000.0);
        assert!(predicted_cov[[0, 0]] > cov[[0, 0]]);
    }

    #[test]
    fn test_predict_clamps_shrinking_area() {
        let kf = KalmanFilter::new();
        let (mut mean, cov) = kf.initiate([10.0, 10.0, 4.0, 1.0]);
        mean[6] = -10.0;
        let (predicted, _) = kf.predict(&mean, &cov);
        assert_eq!(predicted[2], 4.0);
        assert_eq!(predicted[6], 0.0);
    }

    #[test]
    fn test_update_learns_velocity() {
        let kf = KalmanFilter::new();
        let (mut mean, mut cov) = kf.initiate([100.0, 100.0, 400.0, 1.0]);
        for step in 1..=5 {
            let (m, c) = kf.predict(&mean, &cov);
            let (m, c) = kf
                .update(&m, &c, [100.0 + 5.0 * step as f64, 100.0, 400.0, 1.0])
                .unwrap();
            mean = m;
            cov = c;
        }
        // Center x velocity converges towards 5 px/frame.
        assert!(mean[4] > 3.0 && mean[4] < 7.0, "vx = {}", mean[4]);
    }
}
