use std::f64::consts::PI;
use ndarray::Array1;
use serde::{Serialize, Deserialize};
use crate::numerics::spline::CubicSpline;


/**
 * User-facing mesh description: a fixed logarithmic radial grid from the
 * inner truncation radius out to the (dimensionless) outer radius 1, with
 * a rotation curve that turns over from an inner power law to flat.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mesh {

    /// Number of radial cells
    pub num_cells: usize,

    /// Inner truncation radius, in units of the outer radius
    pub x_min: f64,

    /// Power-law index of the rotation curve inside the turnover radius
    #[serde(default)]
    pub inner_power_law: f64,

    /// Turnover radius of the rotation curve (dimensionless); zero or
    /// negative means a flat curve everywhere
    #[serde(default)]
    pub turnover_radius: f64,

    /// Sharpness of the power-law-to-flat transition
    #[serde(default = "Mesh::default_softening")]
    pub softening: f64,

    /// Subcell refinement factor for the stellar drift integration
    #[serde(default = "Mesh::default_refine")]
    pub refine: usize,
}


/**
 * The immutable per-cell geometry: radii, rotation curve, potential, cell
 * widths, and the derived logarithmic-stencil factors used by every finite
 * difference in the code.
 */
pub struct MeshGeometry {
    pub nx: usize,
    pub x: Array1<f64>,
    pub u: Array1<f64>,
    pub beta: Array1<f64>,
    pub betap: Array1<f64>,
    pub psi: Array1<f64>,
    pub dx: Array1<f64>,
    pub dlnx: f64,
    pub x_min: f64,
    pub refine: usize,

    // d = exp(dlnx) and friends; these appear in every stencil
    pub d: f64,
    pub dm1: f64,    // d - 1
    pub dmm1: f64,   // 1 - 1/d
    pub dmdinv: f64, // d - 1/d
    pub sqd: f64,    // sqrt(d)

    inner_power_law: f64,
    turnover_radius: f64,
    softening: f64,
    psi_spline: CubicSpline,
}


// ============================================================================
impl Mesh {

    fn default_softening() -> f64 {
        2.0
    }

    fn default_refine() -> usize {
        2
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_cells < 8 {
            anyhow::bail!("num_cells must be at least 8")
        }
        if !(self.x_min > 0.0 && self.x_min < 1.0) {
            anyhow::bail!("x_min must lie in (0, 1)")
        }
        if self.inner_power_law < 0.0 || self.inner_power_law > 1.0 {
            anyhow::bail!("inner_power_law must lie in [0, 1]")
        }
        if self.softening <= 0.0 {
            anyhow::bail!("softening must be positive")
        }
        if self.refine == 0 {
            anyhow::bail!("refine must be at least 1")
        }
        Ok(())
    }

    pub fn geometry(&self) -> MeshGeometry {
        let nx = self.num_cells;
        let dlnx = -self.x_min.ln() / (nx - 1) as f64;

        let x = Array1::from_iter((0..nx).map(|i| self.x_min * (dlnx * i as f64).exp()));
        let u = x.mapv(|xi| self.u_of(xi));
        let beta = x.mapv(|xi| self.beta_of(xi));
        let betap = x.mapv(|xi| self.betap_of(xi));
        let dx = &x * dlnx;

        // Integrate the potential psi(x) = int u^2 / x dx once at high
        // resolution, then keep it as a spline so subcell lookups during
        // the stellar drift integration stay cheap.
        let nfine = 32 * nx;
        let dlnf = -self.x_min.ln() / (nfine - 1) as f64;
        let mut xs = Vec::with_capacity(nfine);
        let mut ps = Vec::with_capacity(nfine);
        let mut acc = 0.0;
        let mut x_prev = self.x_min;
        let mut f_prev = self.u_of(x_prev).powi(2) / x_prev;
        xs.push(x_prev);
        ps.push(0.0);
        for i in 1..nfine {
            let xi = self.x_min * (dlnf * i as f64).exp();
            let fi = self.u_of(xi).powi(2) / xi;
            acc += 0.5 * (fi + f_prev) * (xi - x_prev);
            xs.push(xi);
            ps.push(acc);
            x_prev = xi;
            f_prev = fi;
        }
        // shift so psi = 0 at the outer radius
        let psi_outer = ps[nfine - 1];
        for p in ps.iter_mut() {
            *p -= psi_outer;
        }
        let psi_spline = CubicSpline::new(xs, ps);
        let psi = x.mapv(|xi| psi_spline.eval(xi));

        let d = dlnx.exp();
        MeshGeometry {
            nx,
            x,
            u,
            beta,
            betap,
            psi,
            dx,
            dlnx,
            x_min: self.x_min,
            refine: self.refine,
            d,
            dm1: dlnx.exp_m1(),
            dmm1: -(-dlnx).exp_m1(),
            dmdinv: (2.0 * dlnx).exp_m1() / dlnx.exp(),
            sqd: (dlnx / 2.0).exp(),
            inner_power_law: self.inner_power_law,
            turnover_radius: self.turnover_radius,
            softening: self.softening,
            psi_spline,
        }
    }

    fn u_of(&self, x: f64) -> f64 {
        let n = self.inner_power_law;
        let b = self.turnover_radius;
        if n == 0.0 || b <= 0.0 {
            return 1.0;
        }
        let s = self.softening;
        let w = (x / b).powf(n * s);
        (x / b).powf(n) / (1.0 + w).powf(1.0 / s)
    }

    fn beta_of(&self, x: f64) -> f64 {
        let n = self.inner_power_law;
        let b = self.turnover_radius;
        if n == 0.0 || b <= 0.0 {
            return 0.0;
        }
        let w = (x / b).powf(n * self.softening);
        n / (1.0 + w)
    }

    fn betap_of(&self, x: f64) -> f64 {
        let n = self.inner_power_law;
        let b = self.turnover_radius;
        if n == 0.0 || b <= 0.0 {
            return 0.0;
        }
        let s = self.softening;
        let w = (x / b).powf(n * s);
        -n * n * s * w / (x * (1.0 + w) * (1.0 + w))
    }
}


// ============================================================================
impl MeshGeometry {

    /// Radius at a continuous cell coordinate (0.0 is the innermost cell)
    pub fn x_at(&self, cell: f64) -> f64 {
        self.x_min * (self.dlnx * cell).exp()
    }

    pub fn u_at(&self, x: f64) -> f64 {
        let n = self.inner_power_law;
        let b = self.turnover_radius;
        if n == 0.0 || b <= 0.0 {
            return 1.0;
        }
        let s = self.softening;
        let w = (x / b).powf(n * s);
        (x / b).powf(n) / (1.0 + w).powf(1.0 / s)
    }

    pub fn beta_at(&self, x: f64) -> f64 {
        let n = self.inner_power_law;
        let b = self.turnover_radius;
        if n == 0.0 || b <= 0.0 {
            return 0.0;
        }
        let w = (x / b).powf(n * self.softening);
        n / (1.0 + w)
    }

    pub fn psi_at(&self, x: f64) -> f64 {
        self.psi_spline.eval(x)
    }

    /// Orbital period at the innermost cell
    pub fn inner_orbital_time(&self) -> f64 {
        2.0 * PI * self.x[0] / self.u[0]
    }

    /// Central difference of a per-cell quantity, one-sided at the ends
    pub fn ddx(&self, v: &Array1<f64>, i: usize) -> f64 {
        let n = self.nx;
        if i == 0 {
            (v[1] - v[0]) / (self.x[1] - self.x[0])
        } else if i == n - 1 {
            (v[n - 1] - v[n - 2]) / (self.x[n - 1] - self.x[n - 2])
        } else {
            (v[i + 1] - v[i - 1]) / (self.x[i + 1] - self.x[i - 1])
        }
    }
}


// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn flat(nx: usize) -> MeshGeometry {
        Mesh {
            num_cells: nx,
            x_min: 0.01,
            inner_power_law: 0.0,
            turnover_radius: 0.0,
            softening: 2.0,
            refine: 2,
        }
        .geometry()
    }

    #[test]
    fn grid_spans_xmin_to_one() {
        let g = flat(200);
        assert!((g.x[0] - 0.01).abs() < 1e-14);
        assert!((g.x[199] - 1.0).abs() < 1e-12);
        // uniform logarithmic spacing
        let r0 = g.x[1] / g.x[0];
        let r1 = g.x[150] / g.x[149];
        assert!((r0 - r1).abs() < 1e-12);
        assert!((r0 - g.d).abs() < 1e-12);
    }

    #[test]
    fn stencil_factors_are_consistent() {
        let g = flat(100);
        assert!((g.dm1 - (g.d - 1.0)).abs() < 1e-14);
        assert!((g.dmm1 - (1.0 - 1.0 / g.d)).abs() < 1e-14);
        assert!((g.dmdinv - (g.d - 1.0 / g.d)).abs() < 1e-14);
        assert!((g.sqd * g.sqd - g.d).abs() < 1e-14);
    }

    #[test]
    fn flat_curve_potential_is_logarithmic() {
        let g = flat(120);
        for &i in &[0usize, 30, 60, 119] {
            assert!((g.psi[i] - g.x[i].ln()).abs() < 1e-4, "psi({}) = {}", g.x[i], g.psi[i]);
        }
    }

    #[test]
    fn turnover_curve_rises_then_flattens() {
        let g = Mesh {
            num_cells: 150,
            x_min: 0.005,
            inner_power_law: 0.5,
            turnover_radius: 0.05,
            softening: 2.0,
            refine: 2,
        }
        .geometry();
        assert!(g.u[0] < 0.5);
        assert!((g.u[149] - 1.0).abs() < 0.05);
        // beta falls from its inner value toward zero
        assert!(g.beta[0] > 0.4);
        assert!(g.beta[149] < 0.01);
        // betap is the radial derivative of beta
        let i = 75;
        let num = (g.beta[i + 1] - g.beta[i - 1]) / (g.x[i + 1] - g.x[i - 1]);
        assert!((num - g.betap[i]).abs() < 0.05 * num.abs().max(1e-3));
    }

    #[test]
    fn continuous_coordinates_agree_with_the_grid() {
        let g = flat(80);
        for &i in &[0usize, 17, 79] {
            assert!((g.x_at(i as f64) - g.x[i]).abs() < 1e-13);
        }
    }
}
