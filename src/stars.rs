use std::f64::consts::PI;
use ndarray::Array1;
use crate::mesh::MeshGeometry;
use crate::numerics::spline::CubicSpline;


/**
 * One age bin of stars. Populations are append-only: the disk owns two
 * ordered sequences of them (active ones feed back on the gas through Q;
 * passive ones are advected tracers) and bins are never removed.
 */
#[derive(Clone, Debug)]
pub struct StellarPop {

    /// Column density (dynamical mass; enters gravity)
    pub col: Array1<f64>,

    /// Radial velocity dispersion
    pub sig_r: Array1<f64>,

    /// Vertical (and azimuthal) velocity dispersion
    pub sig_z: Array1<f64>,

    pub z_o: Array1<f64>,
    pub z_fe: Array1<f64>,

    /// Intra-bin variance of the oxygen metallicity
    pub zv_o: Array1<f64>,

    // partial derivatives of Q with respect to this population's state
    pub dqd_s: Array1<f64>,
    pub dqds_r: Array1<f64>,
    pub dqds_z: Array1<f64>,
    pub dqd_s_err: Array1<f64>,
    pub dqds_err: Array1<f64>,

    /// Lookback time at the creation of these stars [s]
    pub age_at_z0: f64,

    /// Lookback-time bounds of the bin [s]: stars forming while the current
    /// lookback time lies in [youngest, oldest) land here
    pub youngest: f64,
    pub oldest: f64,
}


// ============================================================================
/// Lower age bound of the i-th age bin, as a lookback time in seconds
pub fn young_ith_bin(i: usize, lbt_start: f64, nbins: usize) -> f64 {
    if nbins == 1 {
        return 0.0;
    }
    lbt_start * (nbins - i) as f64 / nbins as f64
}

/// Upper age bound of the i-th age bin
pub fn old_ith_bin(i: usize, lbt_start: f64, nbins: usize) -> f64 {
    lbt_start * (nbins - i + 1) as f64 / nbins as f64
}


// ============================================================================
impl StellarPop {

    pub fn new(nx: usize, youngest: f64, oldest: f64) -> Self {
        let zero = || Array1::zeros(nx);
        Self {
            col: zero(),
            sig_r: zero(),
            sig_z: zero(),
            z_o: zero(),
            z_fe: zero(),
            zv_o: zero(),
            dqd_s: zero(),
            dqds_r: zero(),
            dqds_z: zero(),
            dqd_s_err: zero(),
            dqds_err: zero(),
            age_at_z0: 0.0,
            youngest,
            oldest,
        }
    }

    pub fn is_forming(&self, lbt: f64) -> bool {
        self.youngest <= lbt && lbt < self.oldest
    }

    /**
     * Seed this population with a small fraction of an older one. Used when
     * a fresh active bin appears: col/(dcol/dt) on a truly empty bin would
     * drive the time step to zero.
     */
    pub fn extract(&mut self, donor: &mut StellarPop, fraction: f64) {
        self.col.assign(&(&donor.col * fraction));
        donor.col *= 1.0 - fraction;
        self.sig_r.assign(&donor.sig_r);
        self.sig_z.assign(&donor.sig_z);
        self.z_o.assign(&donor.z_o);
        self.z_fe.assign(&donor.z_fe);
        self.zv_o.assign(&donor.zv_o);
    }

    /**
     * Merge another population into this one, conserving mass, kinetic
     * energy in each component, and metal mass; the metallicity variance is
     * pooled exactly.
     */
    pub fn merge(&mut self, other: &StellarPop, min_sig_st: f64) {
        for i in 0..self.col.len() {
            let ca = self.col[i];
            let cb = other.col[i];
            let c = ca + cb;
            if c <= 0.0 {
                continue;
            }
            let sig_r2 = (ca * self.sig_r[i] * self.sig_r[i] + cb * other.sig_r[i] * other.sig_r[i]) / c;
            let sig_z2 = (ca * self.sig_z[i] * self.sig_z[i] + cb * other.sig_z[i] * other.sig_z[i]) / c;
            let z_o = (ca * self.z_o[i] + cb * other.z_o[i]) / c;
            let z_fe = (ca * self.z_fe[i] + cb * other.z_fe[i]) / c;
            let second = (ca * (self.zv_o[i] + self.z_o[i] * self.z_o[i])
                + cb * (other.zv_o[i] + other.z_o[i] * other.z_o[i]))
                / c;

            self.col[i] = c;
            self.sig_r[i] = sig_r2.sqrt().max(min_sig_st);
            self.sig_z[i] = sig_z2.sqrt().max(min_sig_st);
            self.z_o[i] = z_o;
            self.z_fe[i] = z_fe;
            self.zv_o[i] = (second - z_o * z_o).max(0.0);
        }
    }

    /**
     * Radial mass flux across interface `iface` (0 is the inner edge of the
     * innermost cell, nx the outer edge of the disk), with an upwinded
     * column density and zero flux where the drift changes sign.
     */
    pub fn interface_flux(&self, iface: usize, yy: &Array1<f64>, geom: &MeshGeometry) -> f64 {
        let nx = geom.nx;
        if iface == nx {
            return 0.0;
        }
        if iface == 0 {
            return 2.0 * PI * geom.x[0] * yy[0] * self.col[0];
        }
        let mut ym = yy[iface];
        if yy[iface - 1] * yy[iface] <= 0.0 {
            ym = 0.0;
        }
        let cst = if ym > 0.0 { self.col[iface - 1] } else { self.col[iface] };
        2.0 * PI * geom.x[iface] * ym * cst
    }

    /// Rate of change of this population's column density from migration
    pub fn migration_rate(&self, i: usize, yy: &Array1<f64>, geom: &MeshGeometry) -> f64 {
        let f_in = self.interface_flux(i, yy, geom);
        let f_out = self.interface_flux(i + 1, yy, geom);
        (f_in - f_out) / (geom.x[i] * geom.dx[i])
    }

    /**
     * Move stars radially over dt with the drift field yy, conserving mass,
     * kinetic energy, and metal mass. Inward-moving stars release orbital
     * energy: mass arriving from the donor cell carries its radial
     * dispersion plus (2/3) dpsi + (1/3) du^2; the vertical component and
     * the metals advect unchanged. Returns the mass (in the col x dx
     * measure) pushed through the inner boundary, positive inward.
     */
    pub fn migrate(
        &mut self,
        dt: f64,
        yy: &Array1<f64>,
        geom: &MeshGeometry,
        min_sig_st: f64,
    ) -> anyhow::Result<f64> {
        let nx = geom.nx;

        let mut mass = vec![0.0; nx];
        let mut e_r = vec![0.0; nx];
        let mut e_z = vec![0.0; nx];
        let mut m_o = vec![0.0; nx];
        let mut m_fe = vec![0.0; nx];
        let mut s2_o = vec![0.0; nx];
        for i in 0..nx {
            let m = self.col[i] * geom.x[i] * geom.dx[i];
            mass[i] = m;
            e_r[i] = m * self.sig_r[i] * self.sig_r[i];
            e_z[i] = m * self.sig_z[i] * self.sig_z[i];
            m_o[i] = m * self.z_o[i];
            m_fe[i] = m * self.z_fe[i];
            s2_o[i] = m * (self.zv_o[i] + self.z_o[i] * self.z_o[i]);
        }

        // interior interfaces
        for k in 1..nx {
            let f = self.interface_flux(k, yy, geom);
            if f == 0.0 {
                continue;
            }
            let (don, rec) = if f < 0.0 { (k, k - 1) } else { (k - 1, k) };
            let dm = f.abs() * dt;
            let er_spec = self.sig_r[don] * self.sig_r[don]
                + (2.0 / 3.0) * (geom.psi[don] - geom.psi[rec])
                + (1.0 / 3.0) * (geom.u[don] * geom.u[don] - geom.u[rec] * geom.u[rec]);
            mass[don] -= dm;
            mass[rec] += dm;
            e_r[don] -= dm * self.sig_r[don] * self.sig_r[don];
            e_r[rec] += dm * er_spec;
            e_z[don] -= dm * self.sig_z[don] * self.sig_z[don];
            e_z[rec] += dm * self.sig_z[don] * self.sig_z[don];
            m_o[don] -= dm * self.z_o[don];
            m_o[rec] += dm * self.z_o[don];
            m_fe[don] -= dm * self.z_fe[don];
            m_fe[rec] += dm * self.z_fe[don];
            let snd = self.zv_o[don] + self.z_o[don] * self.z_o[don];
            s2_o[don] -= dm * snd;
            s2_o[rec] += dm * snd;
        }

        // inner boundary: stars spiral into the bulge
        let f0 = self.interface_flux(0, yy, geom);
        let through_ib = -f0 * dt;
        if f0 < 0.0 {
            let dm = -f0 * dt;
            mass[0] -= dm;
            e_r[0] -= dm * self.sig_r[0] * self.sig_r[0];
            e_z[0] -= dm * self.sig_z[0] * self.sig_z[0];
            m_o[0] -= dm * self.z_o[0];
            m_fe[0] -= dm * self.z_fe[0];
            s2_o[0] -= dm * (self.zv_o[0] + self.z_o[0] * self.z_o[0]);
        }

        for i in 0..nx {
            if mass[i] < 0.0 {
                anyhow::bail!(
                    "stellar migration drove the column density negative: cell {}, col {}, mass {}, dt {}",
                    i,
                    self.col[i],
                    mass[i],
                    dt
                );
            }
            if mass[i] > 0.0 {
                self.col[i] = mass[i] / (geom.x[i] * geom.dx[i]);
                self.sig_r[i] = (e_r[i] / mass[i]).max(0.0).sqrt().max(min_sig_st);
                self.sig_z[i] = (e_z[i] / mass[i]).max(0.0).sqrt().max(min_sig_st);
                let z_o = m_o[i] / mass[i];
                self.z_o[i] = z_o;
                self.z_fe[i] = m_fe[i] / mass[i];
                self.zv_o[i] = (s2_o[i] / mass[i] - z_o * z_o).max(0.0);
            } else {
                self.col[i] = 0.0;
            }
        }
        Ok(through_ib)
    }
}


/**
 * Inputs to the stellar drift integration.
 */
pub struct DriftParams {
    pub q_lim: f64,
    pub tau_heat: f64,
    pub chi: f64,
}


/**
 * Integrate the inward stellar drift y(x) from the outer edge inward.
 * Spiral heating pushes Q_* toward Q_lim on the timescale tau_heat (in
 * local orbital times); wherever Q_* > Q_lim the region is quiescent and y
 * resets to zero. Each mesh cell is subdivided into `geom.refine` substeps
 * over cubic-spline interpolants of the summed active column density and
 * radial dispersion.
 */
pub fn compute_drift(
    geom: &MeshGeometry,
    col_st: &Array1<f64>,
    sig_st: &Array1<f64>,
    p: &DriftParams,
) -> Array1<f64> {
    let nx = geom.nx;
    let nn = geom.refine;
    let mut yy = Array1::zeros(nx);

    let xs: Vec<f64> = geom.x.iter().copied().collect();
    let spline_col = CubicSpline::new(xs.clone(), col_st.to_vec());
    let spline_sig = CubicSpline::new(xs, sig_st.to_vec());

    let qst_at = |x: f64| {
        let b = geom.beta_at(x);
        (2.0 * (b + 1.0)).sqrt() * geom.u_at(x) * spline_sig.eval(x)
            / (PI * p.chi * x * spline_col.eval(x))
    };

    let mut yn = 0.0;
    for i in (1..=nn * (nx - 1)).rev() {
        let c = i as f64 / nn as f64;
        let cm1 = (i - 1) as f64 / nn as f64;
        let xn = geom.x_at(c);
        let xm = geom.x_at(cm1);

        let qst_m = qst_at(xm);
        if !qst_m.is_finite() || qst_m <= 0.0 {
            eprintln!(
                "WARNING: ill-defined Q_* during drift integration at x={}: Q_*={}; setting y=0",
                xm, qst_m
            );
            yn = 0.0;
            if (i - 1) % nn == 0 {
                yy[(i - 1) / nn] = 0.0;
            }
            continue;
        }

        if qst_m > p.q_lim {
            yn = 0.0;
            if (i - 1) % nn == 0 {
                yy[(i - 1) / nn] = 0.0;
            }
            continue;
        }

        let sig_m = spline_sig.eval(xm);
        let sigp2 = (2.0 / 3.0) * (geom.psi_at(xn) - geom.psi_at(xm))
            + (1.0 / 3.0) * (geom.u_at(xn).powi(2) - geom.u_at(xm).powi(2))
            + spline_sig.eval(xn).powi(2);
        let mut ym = yn * xn * spline_col.eval(xn) / (xm * spline_col.eval(xm))
            * (1.5 - sigp2 / (2.0 * sig_m * sig_m))
            - (p.q_lim - qst_m).max(0.0) * geom.u_at(xm) * (xn - xm)
                / (2.0 * PI * xm * p.tau_heat * qst_m);

        // y is an inward drift; a positive or runaway value means the
        // quiescence assumption broke on this subcell
        if !ym.is_finite() || ym > 1.0e-7 || ym.abs() > 100.0 {
            eprintln!(
                "WARNING: stellar drift assumption violated at x={}: y={}; setting y=0",
                xm, ym
            );
            ym = 0.0;
        }
        if (i - 1) % nn == 0 {
            yy[(i - 1) / nn] = ym;
        }
        yn = ym;
    }
    yy
}


// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;

    fn geom(nx: usize) -> MeshGeometry {
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

    fn uniform_pop(g: &MeshGeometry, col: f64, sig: f64) -> StellarPop {
        let nx = g.nx;
        let mut sp = StellarPop::new(nx, 0.0, 1.0);
        sp.col.fill(col);
        sp.sig_r.fill(sig);
        sp.sig_z.fill(0.8 * sig);
        sp.z_o.fill(2.0e-3);
        sp.z_fe.fill(5.0e-4);
        sp
    }

    #[test]
    fn age_bins_partition_the_lookback_interval() {
        let lbt = 3.0e17;
        let n = 10;
        for i in 0..n {
            let young = young_ith_bin(i, lbt, n);
            let old = old_ith_bin(i, lbt, n);
            assert!(old > young);
            if i > 0 {
                assert!((old_ith_bin(i, lbt, n) - young_ith_bin(i - 1, lbt, n)).abs() < 1.0);
            }
        }
        assert!((young_ith_bin(n - 1, lbt, n) - lbt / n as f64).abs() < 1.0);
        // the single-bin case is always forming
        assert!((young_ith_bin(0, lbt, 1)).abs() < 1e-30);
        assert!(old_ith_bin(0, lbt, 1) > lbt);
    }

    #[test]
    fn merge_conserves_mass_energy_and_metals() {
        let g = geom(16);
        let mut a = uniform_pop(&g, 1.0, 0.05);
        let mut b = uniform_pop(&g, 0.5, 0.02);
        b.z_o.fill(8.0e-3);
        let m0: f64 = a.col[3] + b.col[3];
        let e0 = a.col[3] * a.sig_r[3] * a.sig_r[3] + b.col[3] * b.sig_r[3] * b.sig_r[3];
        let mz0 = a.col[3] * a.z_o[3] + b.col[3] * b.z_o[3];
        a.merge(&mut b, 1.0e-5);
        assert!((a.col[3] - m0).abs() < 1e-14);
        assert!((a.col[3] * a.sig_r[3] * a.sig_r[3] - e0).abs() < 1e-14);
        assert!((a.col[3] * a.z_o[3] - mz0).abs() < 1e-14);
        // mixing two different metallicities leaves a nonzero spread
        assert!(a.zv_o[3] > 0.0);
    }

    #[test]
    fn extract_moves_a_fraction_and_conserves_the_total() {
        let g = geom(16);
        let mut old = uniform_pop(&g, 2.0, 0.05);
        let mut fresh = StellarPop::new(16, 0.0, 1.0);
        fresh.extract(&mut old, 0.01);
        assert!((fresh.col[5] - 0.02).abs() < 1e-14);
        assert!((old.col[5] - 1.98).abs() < 1e-14);
        assert!((fresh.sig_r[5] - old.sig_r[5]).abs() < 1e-14);
    }

    #[test]
    fn flux_is_upwinded_and_vanishes_at_sign_changes() {
        let g = geom(16);
        let mut sp = uniform_pop(&g, 1.0, 0.05);
        for i in 0..16 {
            sp.col[i] = 1.0 + i as f64;
        }
        let mut yy = Array1::from_elem(16, -1.0e-3);
        // inward drift: donor is the outer cell
        let f = sp.interface_flux(5, &yy, &g);
        assert!(f < 0.0);
        assert!((f - 2.0 * PI * g.x[5] * (-1.0e-3) * sp.col[5]).abs() < 1e-14);
        // sign change across the interface kills the flux
        yy[4] = 1.0e-3;
        assert_eq!(sp.interface_flux(5, &yy, &g), 0.0);
        // outer boundary is closed
        assert_eq!(sp.interface_flux(16, &yy, &g), 0.0);
    }

    #[test]
    fn migration_conserves_mass_up_to_the_inner_boundary() {
        let g = geom(32);
        let mut sp = uniform_pop(&g, 1.0, 0.05);
        let yy = Array1::from_elem(32, -1.0e-3);
        let before: f64 = (0..32).map(|i| sp.col[i] * g.x[i] * g.dx[i]).sum();
        let through = sp.migrate(1.0e-2, &yy, &g, 1.0e-4).unwrap();
        let after: f64 = (0..32).map(|i| sp.col[i] * g.x[i] * g.dx[i]).sum();
        assert!(through > 0.0);
        assert!(((before - after) - through).abs() < 1e-12 * before);
    }

    #[test]
    fn inward_migration_heats_the_receiving_cells() {
        let g = geom(32);
        let mut sp = uniform_pop(&g, 1.0, 0.05);
        let yy = Array1::from_elem(32, -1.0e-3);
        sp.migrate(1.0e-2, &yy, &g, 1.0e-4).unwrap();
        // stars falling inward release orbital energy into random motion
        let mut heated = 0;
        for i in 1..31 {
            if sp.sig_r[i] > 0.05 {
                heated += 1;
            }
        }
        assert!(heated > 20, "only {} cells heated", heated);
    }

    #[test]
    fn drift_is_zero_when_the_stars_are_stable() {
        let g = geom(24);
        // large sig_st: Q_* far above Q_lim everywhere
        let col = Array1::from_elem(24, 0.1);
        let sig = Array1::from_elem(24, 10.0);
        let yy = compute_drift(&g, &col, &sig, &DriftParams { q_lim: 2.5, tau_heat: 2.0, chi: 1.0e-4 });
        for i in 0..24 {
            assert_eq!(yy[i], 0.0);
        }
    }

    #[test]
    fn drift_is_inward_where_stars_are_unstable() {
        let g = Mesh {
            num_cells: 100,
            x_min: 0.01,
            inner_power_law: 0.0,
            turnover_radius: 0.0,
            softening: 2.0,
            refine: 16,
        }
        .geometry();
        // Sigma ~ 1/x makes Q_* uniform and comfortably below Q_lim
        let col = Array1::from_iter((0..100).map(|i| 10.0 / g.x[i]));
        let sig = Array1::from_elem(100, 0.05);
        let yy =
            compute_drift(&g, &col, &sig, &DriftParams { q_lim: 2.5, tau_heat: 2.0, chi: 1.0e-2 });
        let inward = (0..99).filter(|&i| yy[i] < 0.0).count();
        assert!(inward > 80, "only {} cells drift inward", inward);
        // outermost cell is pinned to zero by the boundary condition
        assert_eq!(yy[99], 0.0);
    }
}
