/**
 * Thomas-algorithm solver for tridiagonal systems, with the forward-sweep
 * scratch owned by the caller so that repeated solves do not allocate.
 */

#[derive(thiserror::Error, Debug)]
pub enum TridiagError {

    #[error("singular tridiagonal system (zero pivot at row {0})")]
    SingularPivot(usize),

    #[error("tridiagonal system size mismatch")]
    SizeMismatch,
}


/**
 * Reusable forward-sweep buffers. One workspace per solver site; resized
 * lazily so a single workspace also serves sub-range solves.
 */
#[derive(Clone, Default)]
#[derive(Debug)]
pub struct Workspace {
    c_prime: Vec<f64>,
    d_prime: Vec<f64>,
}


// ============================================================================
impl Workspace {

    pub fn new(n: usize) -> Self {
        Self {
            c_prime: vec![0.0; n],
            d_prime: vec![0.0; n],
        }
    }

    /**
     * Solve A x = rhs where A has sub-diagonal `sub` (first entry unused),
     * main diagonal `diag`, and super-diagonal `sup` (last entry unused).
     * The solution is written into `x`.
     */
    pub fn solve(
        &mut self,
        sub: &[f64],
        diag: &[f64],
        sup: &[f64],
        rhs: &[f64],
        x: &mut [f64],
    ) -> Result<(), TridiagError> {
        let n = diag.len();
        if sub.len() != n || sup.len() != n || rhs.len() != n || x.len() != n {
            return Err(TridiagError::SizeMismatch);
        }
        self.c_prime.resize(n, 0.0);
        self.d_prime.resize(n, 0.0);

        if diag[0] == 0.0 {
            return Err(TridiagError::SingularPivot(0));
        }
        self.c_prime[0] = sup[0] / diag[0];
        self.d_prime[0] = rhs[0] / diag[0];

        for i in 1..n {
            let den = diag[i] - sub[i] * self.c_prime[i - 1];
            if den == 0.0 {
                return Err(TridiagError::SingularPivot(i));
            }
            if i < n - 1 {
                self.c_prime[i] = sup[i] / den;
            }
            self.d_prime[i] = (rhs[i] - sub[i] * self.d_prime[i - 1]) / den;
        }

        x[n - 1] = self.d_prime[n - 1];
        for i in (0..n - 1).rev() {
            x[i] = self.d_prime[i] - self.c_prime[i] * x[i + 1];
        }
        Ok(())
    }
}


// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_system_returns_rhs() {
        let n = 5;
        let sub = vec![0.0; n];
        let diag = vec![1.0; n];
        let sup = vec![0.0; n];
        let rhs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut x = vec![0.0; n];
        Workspace::new(n).solve(&sub, &diag, &sup, &rhs, &mut x).unwrap();
        for i in 0..n {
            assert!((x[i] - rhs[i]).abs() < 1e-14);
        }
    }

    #[test]
    fn laplacian_solution_satisfies_the_system() {
        // [ 2 -1  0  0]   [x0]   [1]
        // [-1  2 -1  0] * [x1] = [0]
        // [ 0 -1  2 -1]   [x2]   [0]
        // [ 0  0 -1  2]   [x3]   [1]
        let sub = vec![0.0, -1.0, -1.0, -1.0];
        let diag = vec![2.0; 4];
        let sup = vec![-1.0, -1.0, -1.0, 0.0];
        let rhs = vec![1.0, 0.0, 0.0, 1.0];
        let mut x = vec![0.0; 4];
        Workspace::new(4).solve(&sub, &diag, &sup, &rhs, &mut x).unwrap();

        let ax = [
            diag[0] * x[0] + sup[0] * x[1],
            sub[1] * x[0] + diag[1] * x[1] + sup[1] * x[2],
            sub[2] * x[1] + diag[2] * x[2] + sup[2] * x[3],
            sub[3] * x[2] + diag[3] * x[3],
        ];
        for i in 0..4 {
            assert!((ax[i] - rhs[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn workspace_is_reusable_across_sizes() {
        let mut ws = Workspace::new(2);
        let mut x = vec![0.0; 3];
        ws.solve(&[0.0, 1.0, 1.0], &[4.0, 4.0, 4.0], &[1.0, 1.0, 0.0], &[6.0, 12.0, 14.0], &mut x)
            .unwrap();
        // Verify by substitution.
        assert!((4.0 * x[0] + x[1] - 6.0).abs() < 1e-12);
        assert!((x[0] + 4.0 * x[1] + x[2] - 12.0).abs() < 1e-12);
        assert!((x[1] + 4.0 * x[2] - 14.0).abs() < 1e-12);
    }

    #[test]
    fn singular_pivot_is_reported() {
        let mut x = vec![0.0; 2];
        let result = Workspace::new(2).solve(&[0.0, 0.0], &[0.0, 1.0], &[0.0, 0.0], &[1.0, 1.0], &mut x);
        assert!(matches!(result, Err(TridiagError::SingularPivot(0))));
    }
}
