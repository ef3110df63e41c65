//! Gauss-Legendre quadrature on line segments.
//!
//! Member loads are integrated against the shape functions in the member's
//! iso-parametric coordinate `ξ ∈ [-1, 1]`.
//!
//! ```
//! use rigel_core::element::gauss::{gauss_on_interval, GaussOrder};
//!
//! // ∫ ξ² dξ over the second half of a member
//! let integral: f64 = gauss_on_interval(GaussOrder::Two, 0.0, 1.0)
//!     .into_iter()
//!     .map(|(xi, w)| xi * xi * w)
//!     .sum();
//! assert!((integral - 1.0 / 3.0).abs() < 1e-14);
//! ```

/// Number of integration points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GaussOrder {
    One,
    Two,
    Three,
    Four,
}

impl GaussOrder {
    pub fn n_points(self) -> usize {
        match self {
            GaussOrder::One => 1,
            GaussOrder::Two => 2,
            GaussOrder::Three => 3,
            GaussOrder::Four => 4,
        }
    }

    /// Highest polynomial degree integrated exactly, `2n - 1`.
    pub fn exact_degree(self) -> usize {
        2 * self.n_points() - 1
    }

    /// Smallest rule exact for polynomials of `degree`.
    pub fn for_degree(degree: usize) -> Option<Self> {
        [GaussOrder::One, GaussOrder::Two, GaussOrder::Three, GaussOrder::Four]
            .into_iter()
            .find(|o| o.exact_degree() >= degree)
    }
}

/// `(ξ, weight)` pairs on [-1, 1].
pub fn gauss_1d(order: GaussOrder) -> Vec<(f64, f64)> {
    match order {
        GaussOrder::One => vec![(0.0, 2.0)],
        GaussOrder::Two => {
            let p = 3.0_f64.sqrt().recip();
            vec![(-p, 1.0), (p, 1.0)]
        }
        GaussOrder::Three => {
            let p = 0.6_f64.sqrt();
            vec![(-p, 5.0 / 9.0), (0.0, 8.0 / 9.0), (p, 5.0 / 9.0)]
        }
        GaussOrder::Four => {
            let r = 2.0 * 1.2_f64.sqrt();
            let (inner, outer) = (((3.0 - r) / 7.0).sqrt(), ((3.0 + r) / 7.0).sqrt());
            let s = 30.0_f64.sqrt() / 36.0;
            let (w_inner, w_outer) = (0.5 + s, 0.5 - s);
            vec![(-outer, w_outer), (-inner, w_inner), (inner, w_inner), (outer, w_outer)]
        }
    }
}

/// Rule mapped from [-1, 1] onto [a, b]; the weights carry the Jacobian
/// `(b - a) / 2` and sum to `b - a`.
pub fn gauss_on_interval(order: GaussOrder, a: f64, b: f64) -> Vec<(f64, f64)> {
    let half = (b - a) / 2.0;
    let mid = (a + b) / 2.0;
    gauss_1d(order)
        .into_iter()
        .map(|(t, w)| (mid + half * t, w * half))
        .collect()
}
