use pop3d_core::{
    nalgebra::{Matrix2, Vector2},
    Error, Result,
};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Lens distortion with three radial and two tangential coefficients.
///
/// For normalized image coordinates $(x, y)$ and $r^2 = x^2 + y^2$ the distorted point is
///
/// $$
/// \begin{aligned}
/// x' &= x ⋅ (1 + k_1 r^2 + k_2 r^4 + k_3 r^6) + 2 p_1 x y + p_2 (r^2 + 2 x^2) \\\\
/// y' &= y ⋅ (1 + k_1 r^2 + k_2 r^4 + k_3 r^6) + p_1 (r^2 + 2 y^2) + 2 p_2 x y
/// \end{aligned}
/// $$
///
/// Coefficients are stored in the OpenCV order `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct BrownConrady {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl BrownConrady {
    /// Distortion that leaves every point in place.
    pub fn none() -> Self {
        Self::default()
    }

    /// Reads `[k1, k2, p1, p2]` or `[k1, k2, p1, p2, k3]`.
    pub fn from_coefficients(coefficients: &[f64]) -> Result<Self> {
        match *coefficients {
            [k1, k2, p1, p2] => Ok(Self {
                k1,
                k2,
                p1,
                p2,
                k3: 0.0,
            }),
            [k1, k2, p1, p2, k3] => Ok(Self { k1, k2, p1, p2, k3 }),
            _ => Err(Error::InvalidDistortion {
                len: coefficients.len(),
            }),
        }
    }

    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn is_identity(&self) -> bool {
        self.coefficients().iter().all(|&c| c == 0.0)
    }

    fn radial(&self, r2: f64) -> (f64, f64) {
        let value = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let derivative = self.k1 + r2 * (2.0 * self.k2 + r2 * 3.0 * self.k3);
        (value, derivative)
    }

    /// Applies the distortion to a normalized image point.
    pub fn distort(&self, point: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (point.x, point.y);
        let r2 = point.norm_squared();
        let (radial, _) = self.radial(r2);
        Vector2::new(
            x * radial + 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            y * radial + self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Jacobian of [`BrownConrady::distort`] at `point`.
    #[rustfmt::skip]
    pub fn jacobian(&self, point: Vector2<f64>) -> Matrix2<f64> {
        let (x, y) = (point.x, point.y);
        let (radial, d_radial) = self.radial(point.norm_squared());
        let cross = 2.0 * x * y * d_radial + 2.0 * self.p1 * x + 2.0 * self.p2 * y;
        Matrix2::new(
            radial + 2.0 * x * x * d_radial + 2.0 * self.p1 * y + 6.0 * self.p2 * x, cross,
            cross, radial + 2.0 * y * y * d_radial + 6.0 * self.p1 * y + 2.0 * self.p2 * x,
        )
    }

    /// Inverts [`BrownConrady::distort`] with Newton iterations.
    ///
    /// Starts from the distorted point itself and stops once the update is below `epsilon`
    /// or after `max_iterations`.
    pub fn undistort(&self, distorted: Vector2<f64>, epsilon: f64, max_iterations: usize) -> Vector2<f64> {
        if self.is_identity() {
            return distorted;
        }
        let mut point = distorted;
        for _ in 0..max_iterations {
            let residual = self.distort(point) - distorted;
            let step = match self.jacobian(point).try_inverse() {
                Some(inverse) => inverse * residual,
                None => break,
            };
            if !step.iter().all(|n| n.is_finite()) {
                break;
            }
            point -= step;
            if step.x.abs() + step.y.abs() < epsilon {
                break;
            }
        }
        point
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lens() -> BrownConrady {
        BrownConrady::from_coefficients(&[-0.21, 0.08, 0.0012, -0.0007, -0.015]).unwrap()
    }

    #[test]
    fn coefficient_lengths() {
        let four = BrownConrady::from_coefficients(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(four.coefficients(), [0.1, 0.2, 0.3, 0.4, 0.0]);
        assert_eq!(
            BrownConrady::from_coefficients(&[0.1; 3]),
            Err(Error::InvalidDistortion { len: 3 })
        );
        assert_eq!(
            BrownConrady::from_coefficients(&[0.1; 8]),
            Err(Error::InvalidDistortion { len: 8 })
        );
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let lens = lens();
        let point = Vector2::new(0.31, -0.22);
        let h = 1e-7;
        let dx = (lens.distort(point + Vector2::new(h, 0.0)) - lens.distort(point - Vector2::new(h, 0.0))) / (2.0 * h);
        let dy = (lens.distort(point + Vector2::new(0.0, h)) - lens.distort(point - Vector2::new(0.0, h))) / (2.0 * h);
        let numeric = Matrix2::from_columns(&[dx, dy]);
        assert_relative_eq!(lens.jacobian(point), numeric, epsilon = 1e-6);
    }

    #[test]
    fn undistort_inverts_distort() {
        let lens = lens();
        for point in [
            Vector2::new(0.0, 0.0),
            Vector2::new(0.2, 0.1),
            Vector2::new(-0.35, 0.3),
            Vector2::new(0.45, -0.4),
        ] {
            let distorted = lens.distort(point);
            assert_relative_eq!(lens.undistort(distorted, 1e-14, 50), point, epsilon = 1e-10);
        }
    }
}
