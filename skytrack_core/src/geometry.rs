//! Radar geometry primitives.
//!
//! Spherical/Cartesian conversions for the `(azimuth, elevation, range)`
//! frame the sensor reports in, plus the squared Mahalanobis distance used
//! by gating and association.

use nalgebra::{Matrix3, Vector3};

/// Convert a spherical radar report to Cartesian coordinates.
///
/// Azimuth is measured from north (the y axis) toward east (the x axis),
/// elevation from the horizontal plane. Both are in degrees.
pub fn sph2cart(azimuth_deg: f64, elevation_deg: f64, range: f64) -> Vector3<f64> {
    let az = azimuth_deg.to_radians();
    let el = elevation_deg.to_radians();
    Vector3::new(
        range * el.cos() * az.sin(),
        range * el.cos() * az.cos(),
        range * el.sin(),
    )
}

/// Convert a Cartesian position back to `(azimuth_deg, elevation_deg, range)`.
///
/// Left inverse of [`sph2cart`] for `range > 0`. The origin maps to all
/// zeros.
pub fn cart2sph(position: &Vector3<f64>) -> (f64, f64, f64) {
    let range = position.norm();
    if range == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let azimuth = position.x.atan2(position.y).to_degrees();
    let elevation = (position.z / range).asin().to_degrees();
    (azimuth, elevation, range)
}

/// Squared Mahalanobis distance `(b - a)' * S⁻¹ * (b - a)`.
///
/// Non-negative for positive-definite `cov_inv`, zero iff `a == b`.
pub fn mahalanobis(a: &Vector3<f64>, b: &Vector3<f64>, cov_inv: &Matrix3<f64>) -> f64 {
    let residual = b - a;
    let d_squared = residual.transpose() * cov_inv * residual;
    d_squared[(0, 0)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sph2cart_axes() {
        // Azimuth 0 points along +y, azimuth 90 along +x.
        let north = sph2cart(0.0, 0.0, 1.0);
        assert_relative_eq!(north.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(north.x, 0.0, epsilon = 1e-12);

        let east = sph2cart(90.0, 0.0, 1.0);
        assert_relative_eq!(east.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(east.y, 0.0, epsilon = 1e-12);

        let up = sph2cart(0.0, 90.0, 2.0);
        assert_relative_eq!(up.z, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let cases = [
            (30.0, 10.0, 1500.0),
            (-120.0, 45.0, 10.0),
            (179.0, -60.0, 0.5),
        ];
        for (az, el, r) in cases {
            let p = sph2cart(az, el, r);
            let (az2, el2, r2) = cart2sph(&p);
            assert_relative_eq!(az, az2, epsilon = 1e-9);
            assert_relative_eq!(el, el2, epsilon = 1e-9);
            assert_relative_eq!(r, r2, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_mahalanobis_zero_for_equal_points() {
        let a = Vector3::new(3.0, -4.0, 5.0);
        let cov_inv = Matrix3::identity();
        assert_relative_eq!(mahalanobis(&a, &a, &cov_inv), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mahalanobis_identity_is_squared_euclidean() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(1.0, 2.0, 2.0);
        let cov_inv = Matrix3::identity();
        assert_relative_eq!(mahalanobis(&a, &b, &cov_inv), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mahalanobis_scales_with_inverse_covariance() {
        let a = Vector3::zeros();
        let b = Vector3::new(1.0, 0.0, 0.0);
        // Variance 4 along x halves the normalised distance twice over.
        let cov_inv = Matrix3::from_diagonal(&Vector3::new(0.25, 1.0, 1.0));
        assert_relative_eq!(mahalanobis(&a, &b, &cov_inv), 0.25, epsilon = 1e-12);
    }
}
