use ndarray::Array1;
use serde::{Serialize, Deserialize};
use crate::mesh::MeshGeometry;
use crate::numerics::tridiag::Workspace;
use crate::stability::QEval;
use crate::stars::StellarPop;


/**
 * Physical parameters of the simulation, in the dimensionless units of the
 * disk state. Resolved once from the user configuration and owned by the
 * disk for its lifetime.
 */
#[derive(Clone, Debug)]
pub struct DiskParams {

    /// Timescale on which transient spirals push Q_* to Q_lim [local orbits]
    pub tau_heat: f64,

    /// Fraction of the non-thermal kinetic energy dissipated per scale
    /// height crossing time (1.5 = all of it)
    pub eta: f64,

    /// Thermal velocity dispersion floor [vphiR]
    pub sig_th: f64,

    /// Star formation efficiency per free-fall time
    pub eps_ff: f64,

    /// Q_* below which transient spirals heat the stellar disk
    pub q_lim: f64,

    /// The Q value the torque drives the disk toward
    pub fixed_q: f64,

    /// Fractional change per step allowed by the time-step selector
    pub tol: f64,

    /// Thickness correction applied to the gas Q
    pub thickness: f64,

    /// Mass loading factor at the fiducial column/gas-fraction/halo mass
    pub mass_loading_factor: f64,
    pub mlf_col_scaling: f64,
    pub mlf_fg_scaling: f64,
    pub mlf_mh_scaling: f64,

    /// Metal diffusion coefficient
    pub kappa_metals: f64,

    /// Floor on every stellar velocity dispersion [vphiR]
    pub min_sig_st: f64,

    /// Instantaneous and asymptotic remnant fractions, and the enrichment
    /// mixing fraction
    pub rf_inst: f64,
    pub rf_asym: f64,
    pub zeta: f64,

    /// Fraction of the stellar column returned to the gas per unit time;
    /// carries the difference between the instantaneous and asymptotic
    /// remnant fractions back over the cosmological span of the run
    pub recycle_rate: f64,

    /// Yields per species
    pub y_o: f64,
    pub y_fe: f64,

    /// IGM metallicities (absolute mass fractions)
    pub z_igm_o: f64,
    pub z_igm_fe: f64,

    /// Halo mass at the start of the run [Msun]
    pub mh0: f64,

    /// Evaluate Q analytically (Romeo-Wiegert) or numerically (Rafikov)
    pub analytic_q: bool,

    /// Advect the passive populations too
    pub migrate_passive: bool,

    pub n_active: usize,
    pub n_passive: usize,

    /// MRI viscosity floor
    pub alpha_mri: f64,

    /// Cells over which the GI-to-MRI handoff is blended
    pub ndecay: f64,

    /// Torque at the inner boundary
    pub ibc_tau: f64,

    /// Turbulent energy injected by accretion at the outer edge
    pub accretion_heating: f64,

    /// Cloud-star scattering rate (Lacey 1984 form, shape factor absorbed)
    pub cloud_heating: f64,
}


/**
 * Compact description of a relaxed disk, persisted between the warm-up and
 * production runs.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Initializer {
    pub col: Vec<f64>,
    pub sig: Vec<f64>,
    pub col_st: Vec<f64>,
    pub sig_st: Vec<f64>,
}


/**
 * Scratch buffers for the tridiagonal solves. Allocated once with the disk
 * and reused every step.
 */
#[derive(Debug)]
pub struct Scratch {
    pub ws: Workspace,
    pub sub: Vec<f64>,
    pub diag: Vec<f64>,
    pub sup: Vec<f64>,
    pub rhs: Vec<f64>,
    pub sol: Vec<f64>,
    pub eta: Vec<f64>,
    pub xi: Vec<f64>,
}

impl Scratch {
    pub fn new(nx: usize) -> Self {
        Self {
            ws: Workspace::new(nx),
            sub: vec![0.0; nx],
            diag: vec![0.0; nx],
            sup: vec![0.0; nx],
            rhs: vec![0.0; nx],
            sol: vec![0.0; nx],
            eta: vec![0.0; nx + 1],
            xi: vec![0.0; nx + 1],
        }
    }
}


/**
 * The mutable centerpiece: per-cell gas state, the stellar population
 * sequences, the torque solution, and the cumulative bookkeeping. All
 * per-cell arrays are indexed 0..nx over the mesh cells.
 */
#[derive(Debug)]
pub struct Disk {
    pub params: DiskParams,
    pub nx: usize,

    // gas state
    pub col: Array1<f64>,
    pub sig: Array1<f64>,
    pub z_o: Array1<f64>,
    pub z_fe: Array1<f64>,

    // partial derivatives of Q with respect to the gas state
    pub dqd_s: Array1<f64>,
    pub dqds: Array1<f64>,
    pub dqd_s_err: Array1<f64>,
    pub dqds_err: Array1<f64>,

    // time derivatives and rates
    pub dcoldt: Array1<f64>,
    pub dsigdt: Array1<f64>,
    pub dzodt: Array1<f64>,
    pub dzfedt: Array1<f64>,
    pub col_sfr: Array1<f64>,
    pub mass_loading: Array1<f64>,
    pub f_h2: Array1<f64>,

    // torque equation: coefficients, forcing, solution, derivatives
    pub h0: Array1<f64>,
    pub h1: Array1<f64>,
    pub h2: Array1<f64>,
    pub hh: Array1<f64>,
    pub tau: Array1<f64>,
    pub taup: Array1<f64>,
    pub taupp: Array1<f64>,
    pub keep_torque_off: Vec<u8>,

    /// Column-density drain fed back into the torque forcing when an
    /// artificial diffusion channel is active; stays zero otherwise
    pub diffused_dcoldt: Array1<f64>,

    /// Inward stellar drift from the latest drift integration
    pub yy: Array1<f64>,

    // stellar populations
    pub sps_active: Vec<StellarPop>,
    pub sps_passive: Vec<StellarPop>,

    // cumulative per-cell diagnostics
    pub cumulative_sf: Array1<f64>,
    pub cumulative_torque_err: Array1<f64>,
    pub cu_stars_out: Array1<f64>,
    pub cu_gas_out: Array1<f64>,

    // bulge and global bookkeeping; the bulge mass stays in the
    // dimensionless mass measure, the cumulative counters are in Msun
    pub m_bulge: f64,
    pub z_bulge_o: f64,
    pub z_bulge_fe: f64,
    pub initial_gas_mass: f64,
    pub initial_stellar_mass: f64,
    pub cumulative_mass_accreted: f64,
    pub cumulative_sf_mass: f64,
    pub cumulative_gas_through_ib: f64,
    pub cumulative_stars_through_ib: f64,
    pub cumulative_mass_ejected: f64,
    pub cumulative_torque: f64,

    pub q_eval: QEval,
    pub scratch: Scratch,
}


// ============================================================================
impl Disk {

    pub fn new(params: DiskParams, nx: usize) -> Self {
        let zero = || Array1::zeros(nx);
        let q_eval = if params.analytic_q {
            QEval::Analytic
        } else {
            QEval::Numerical { most_recent_q: 1.0 }
        };
        Self {
            nx,
            col: zero(),
            sig: zero(),
            z_o: zero(),
            z_fe: zero(),
            dqd_s: zero(),
            dqds: zero(),
            dqd_s_err: zero(),
            dqds_err: zero(),
            dcoldt: zero(),
            dsigdt: zero(),
            dzodt: zero(),
            dzfedt: zero(),
            col_sfr: zero(),
            mass_loading: zero(),
            f_h2: zero(),
            h0: zero(),
            h1: zero(),
            h2: zero(),
            hh: zero(),
            tau: zero(),
            taup: zero(),
            taupp: zero(),
            keep_torque_off: vec![0; nx],
            diffused_dcoldt: zero(),
            yy: zero(),
            sps_active: Vec::new(),
            sps_passive: Vec::new(),
            cumulative_sf: zero(),
            cumulative_torque_err: zero(),
            cu_stars_out: zero(),
            cu_gas_out: zero(),
            m_bulge: 0.0,
            z_bulge_o: params.z_igm_o,
            z_bulge_fe: params.z_igm_fe,
            initial_gas_mass: 0.0,
            initial_stellar_mass: 0.0,
            cumulative_mass_accreted: 0.0,
            cumulative_sf_mass: 0.0,
            cumulative_gas_through_ib: 0.0,
            cumulative_stars_through_ib: 0.0,
            cumulative_mass_ejected: 0.0,
            cumulative_torque: 0.0,
            q_eval,
            scratch: Scratch::new(nx),
            params,
        }
    }

    /// Sum of a per-area quantity over the disk, weighted by annulus area
    pub fn total_weighted_by_area(&self, per_area: &Array1<f64>, geom: &MeshGeometry) -> f64 {
        let mut sum = 0.0;
        for i in 0..self.nx {
            sum += per_area[i] * geom.x[i] * geom.x[i] * geom.dlnx;
        }
        sum
    }

    /// Summed column density of the active populations
    pub fn active_col_st(&self, i: usize) -> f64 {
        self.sps_active.iter().map(|sp| sp.col[i]).sum()
    }

    /// Mass-weighted rms radial dispersion of the active populations
    pub fn active_sig_st_r(&self, i: usize) -> f64 {
        let col = self.active_col_st(i);
        if col <= 0.0 {
            return self.params.min_sig_st;
        }
        let e: f64 = self.sps_active.iter().map(|sp| sp.col[i] * sp.sig_r[i] * sp.sig_r[i]).sum();
        (e / col).sqrt()
    }

    /// Mass-weighted rms vertical dispersion of the active populations
    pub fn active_sig_st_z(&self, i: usize) -> f64 {
        let col = self.active_col_st(i);
        if col <= 0.0 {
            return self.params.min_sig_st;
        }
        let e: f64 = self.sps_active.iter().map(|sp| sp.col[i] * sp.sig_z[i] * sp.sig_z[i]).sum();
        (e / col).sqrt()
    }

    /// Gas fraction at a cell
    pub fn f_g(&self, i: usize) -> f64 {
        let cst = self.active_col_st(i);
        self.col[i] / (self.col[i] + cst)
    }

    /// Record the current state for a later production run
    pub fn store(&self) -> Initializer {
        let nx = self.nx;
        Initializer {
            col: self.col.to_vec(),
            sig: self.sig.to_vec(),
            col_st: (0..nx).map(|i| self.active_col_st(i)).collect(),
            sig_st: (0..nx).map(|i| self.active_sig_st_r(i)).collect(),
        }
    }

    /**
     * Verify the hard invariants on the state variables; called after every
     * update. Violations are fatal and name the cell and values.
     */
    pub fn check_state_vars(&self, context: &str) -> anyhow::Result<()> {
        for i in 0..self.nx {
            let col = self.col[i];
            let sig = self.sig[i];
            let zo = self.z_o[i];
            let zfe = self.z_fe[i];
            if !(col > 0.0) || !col.is_finite() || !sig.is_finite() || sig < 0.0 {
                anyhow::bail!(
                    "{}: non-physical gas state at cell {}: col={} sig={} dcoldt={} dsigdt={}",
                    context, i, col, sig, self.dcoldt[i], self.dsigdt[i]
                );
            }
            if !(zo > 0.0 && zo < 1.0) || !(zfe > 0.0 && zfe < 1.0) {
                anyhow::bail!(
                    "{}: metallicity out of range at cell {}: Z_O={} Z_Fe={}",
                    context, i, zo, zfe
                );
            }
            for (s, sp) in self.sps_active.iter().enumerate() {
                if sp.col[i] < 0.0 || !sp.col[i].is_finite() {
                    anyhow::bail!(
                        "{}: negative stellar column density at cell {} (active population {}): {}",
                        context, i, s, sp.col[i]
                    );
                }
            }
        }
        Ok(())
    }
}


// ============================================================================
#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::mesh::Mesh;

    pub fn test_params() -> DiskParams {
        DiskParams {
            tau_heat: 2.0,
            eta: 1.5,
            sig_th: 0.01,
            eps_ff: 0.01,
            q_lim: 2.5,
            fixed_q: 2.0,
            tol: 1.0e-4,
            thickness: 1.5,
            mass_loading_factor: 1.0,
            mlf_col_scaling: 0.0,
            mlf_fg_scaling: 0.0,
            mlf_mh_scaling: 0.0,
            kappa_metals: 1.0e-3,
            min_sig_st: 1.0e-3,
            rf_inst: 0.46,
            rf_asym: 0.46,
            zeta: 1.0,
            recycle_rate: 0.0,
            y_o: 0.054,
            y_fe: 0.0017,
            z_igm_o: 5.7e-4,
            z_igm_fe: 1.3e-4,
            mh0: 1.0e12,
            analytic_q: true,
            migrate_passive: true,
            n_active: 1,
            n_passive: 10,
            alpha_mri: 0.0,
            ndecay: 6.0,
            ibc_tau: 0.0,
            accretion_heating: 0.0,
            cloud_heating: 0.0,
        }
    }

    #[test]
    fn area_weighted_total_matches_the_analytic_annulus_sum() {
        let geom = Mesh {
            num_cells: 64,
            x_min: 0.01,
            inner_power_law: 0.0,
            turnover_radius: 0.0,
            softening: 2.0,
            refine: 2,
        }
        .geometry();
        let mut disk = Disk::new(test_params(), 64);
        disk.col.fill(1.0);
        // sum of x^2 dlnx approximates int x dx = (1 - xmin^2)/2
        let total = disk.total_weighted_by_area(&disk.col, &geom);
        assert!((total - 0.5).abs() < 0.05, "total = {}", total);
    }

    #[test]
    fn active_reductions_combine_populations_in_quadrature() {
        let mut disk = Disk::new(test_params(), 8);
        let mut a = crate::stars::StellarPop::new(8, 0.0, 1.0);
        let mut b = crate::stars::StellarPop::new(8, 0.0, 1.0);
        a.col.fill(3.0);
        a.sig_r.fill(0.1);
        a.sig_z.fill(0.05);
        b.col.fill(1.0);
        b.sig_r.fill(0.2);
        b.sig_z.fill(0.1);
        disk.sps_active.push(a);
        disk.sps_active.push(b);
        assert!((disk.active_col_st(0) - 4.0).abs() < 1e-14);
        let expect = ((3.0 * 0.01 + 1.0 * 0.04) / 4.0_f64).sqrt();
        assert!((disk.active_sig_st_r(0) - expect).abs() < 1e-14);
        assert!(disk.active_sig_st_z(0) < disk.active_sig_st_r(0));
    }

    #[test]
    fn state_check_names_the_offending_cell() {
        let mut disk = Disk::new(test_params(), 4);
        disk.col.fill(1.0);
        disk.sig.fill(0.05);
        disk.z_o.fill(2.0e-3);
        disk.z_fe.fill(5.0e-4);
        assert!(disk.check_state_vars("test").is_ok());
        disk.z_o[2] = 1.5;
        let err = disk.check_state_vars("test").unwrap_err().to_string();
        assert!(err.contains("cell 2"), "message was: {}", err);
    }
}
