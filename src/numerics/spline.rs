use crate::numerics::tridiag::Workspace;


/**
 * Natural cubic spline over strictly increasing abscissas. Built once per
 * call site and evaluated many times; evaluation clamps to the tabulated
 * range so subcell lookups at the mesh edges stay defined.
 */
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    y2: Vec<f64>,
}


// ============================================================================
impl CubicSpline {

    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        assert!(x.len() == y.len() && x.len() >= 3, "spline needs at least three points");
        for w in x.windows(2) {
            assert!(w[1] > w[0], "spline abscissas must increase monotonically");
        }
        let n = x.len();
        let mut sub = vec![0.0; n];
        let mut diag = vec![1.0; n];
        let mut sup = vec![0.0; n];
        let mut rhs = vec![0.0; n];

        for i in 1..n - 1 {
            let hl = x[i] - x[i - 1];
            let hr = x[i + 1] - x[i];
            sub[i] = hl / 6.0;
            diag[i] = (hl + hr) / 3.0;
            sup[i] = hr / 6.0;
            rhs[i] = (y[i + 1] - y[i]) / hr - (y[i] - y[i - 1]) / hl;
        }

        let mut y2 = vec![0.0; n];
        Workspace::new(n)
            .solve(&sub, &diag, &sup, &rhs, &mut y2)
            .expect("natural spline system is diagonally dominant");
        Self { x, y, y2 }
    }

    pub fn eval(&self, at: f64) -> f64 {
        let n = self.x.len();
        let at = at.clamp(self.x[0], self.x[n - 1]);

        let hi = match self.x.binary_search_by(|xi| xi.partial_cmp(&at).unwrap()) {
            Ok(i) => return self.y[i],
            Err(i) => i.clamp(1, n - 1),
        };
        let lo = hi - 1;
        let h = self.x[hi] - self.x[lo];
        let a = (self.x[hi] - at) / h;
        let b = (at - self.x[lo]) / h;
        a * self.y[lo]
            + b * self.y[hi]
            + ((a * a * a - a) * self.y2[lo] + (b * b * b - b) * self.y2[hi]) * h * h / 6.0
    }
}


// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spline_reproduces_nodes_exactly() {
        let x = vec![0.0, 1.0, 2.5, 4.0];
        let y = vec![1.0, -2.0, 0.5, 3.0];
        let s = CubicSpline::new(x.clone(), y.clone());
        for i in 0..x.len() {
            assert!((s.eval(x[i]) - y[i]).abs() < 1e-13);
        }
    }

    #[test]
    fn spline_is_exact_for_straight_lines() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 3.0 * v - 1.0).collect();
        let s = CubicSpline::new(x, y);
        assert!((s.eval(4.3) - (3.0 * 4.3 - 1.0)).abs() < 1e-12);
        assert!((s.eval(0.05) - (3.0 * 0.05 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn spline_tracks_a_smooth_function_between_nodes() {
        let x: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|&v| v.sin()).collect();
        let s = CubicSpline::new(x, y);
        for &p in &[0.37, 1.23, 2.71, 3.55] {
            assert!((s.eval(p) - p.sin()).abs() < 1e-4);
        }
    }

    #[test]
    fn evaluation_clamps_to_the_tabulated_range() {
        let s = CubicSpline::new(vec![1.0, 2.0, 3.0], vec![1.0, 4.0, 9.0]);
        assert!((s.eval(0.0) - s.eval(1.0)).abs() < 1e-14);
        assert!((s.eval(5.0) - s.eval(3.0)).abs() < 1e-14);
    }
}
