use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use crate::dimensions::{Z_SOL_FE, Z_SOL_O};
use crate::models::{finalize, InitialModel};
use crate::stability::enforce_fixed_q;
use crate::stars::{old_ith_bin, young_ith_bin, StellarPop};
use crate::state::{Disk, DiskParams};
use crate::stepper::Setup;


/**
 * The simplest initial condition: constant gas fraction and constant
 * stellar-to-gas dispersion ratio at every radius, with the column density
 * set by inverting Q = Q_f.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UniformRatio {

    /// Initial gas fraction
    pub fg0: f64,

    /// Initial sigma_* / sigma_g
    pub phi0: f64,
}


// ============================================================================
impl InitialModel for UniformRatio {

    fn validate(&self) -> anyhow::Result<()> {
        if !(self.fg0 > 0.0 && self.fg0 <= 1.0) {
            anyhow::bail!("fg0 must lie in (0, 1]")
        }
        if self.phi0 <= 0.0 {
            anyhow::bail!("phi0 must be positive")
        }
        Ok(())
    }

    fn build(&self, params: DiskParams, setup: &Setup) -> anyhow::Result<Disk> {
        let geom = &setup.geom;
        let nx = geom.nx;
        let chi = setup.dims.chi();
        let lbt_start = setup.cosmic.lbt_start();

        let mut disk = Disk::new(params, nx);
        let p = disk.params.clone();

        let mut active = StellarPop::new(
            nx,
            young_ith_bin(0, lbt_start, p.n_active),
            old_ith_bin(0, lbt_start, p.n_active),
        );
        active.age_at_z0 = lbt_start;

        let z_o = 0.1 * Z_SOL_O;
        let z_fe = 0.1 * Z_SOL_FE;
        for i in 0..nx {
            disk.z_o[i] = z_o;
            disk.z_fe[i] = z_fe;
            disk.sig[i] = (chi / (p.eta * self.fg0)).powf(1.0 / 3.0) / 2.0_f64.sqrt();
            disk.col[i] = (p.thickness / p.fixed_q)
                * geom.u[i]
                * (2.0 * (geom.beta[i] + 1.0)).sqrt()
                * disk.sig[i]
                * self.phi0
                / (geom.x[i] * PI * chi * (self.phi0 + (1.0 - self.fg0) / self.fg0));
            active.col[i] = disk.col[i] * (1.0 - self.fg0) / self.fg0;
            active.sig_r[i] = (self.phi0 * disk.sig[i]).max(p.min_sig_st);
            active.sig_z[i] = active.sig_r[i];
            active.z_o[i] = z_o;
            active.z_fe[i] = z_fe;

            if disk.col[i] < 0.0
                || disk.sig[i] < 0.0
                || active.col[i] < 0.0
                || active.sig_r[i] < 0.0
                || !disk.col[i].is_finite()
                || !disk.sig[i].is_finite()
                || !active.col[i].is_finite()
                || !active.sig_r[i].is_finite()
            {
                anyhow::bail!(
                    "non-physical initial state at cell {}: col={} sig={} col_st={} sig_st={}",
                    i, disk.col[i], disk.sig[i], active.col[i], active.sig_r[i]
                );
            }
        }

        let mut passive = active.clone();
        passive.youngest = young_ith_bin(0, lbt_start, p.n_passive);
        passive.oldest = old_ith_bin(0, lbt_start, p.n_passive);
        disk.sps_active.push(active);
        disk.sps_passive.push(passive);

        // only covary gas and stars if the stars sit well above the floor
        let fixed_phi0 = disk.sps_active[0].sig_r[0] > 2.0 * p.min_sig_st;
        if !fixed_phi0 {
            eprintln!(
                "WARNING: min_sig_st is too high for the initial conditions to be set by \
                 covarying the gas and stellar velocity dispersions"
            );
        }
        enforce_fixed_q(&mut disk, geom, chi, fixed_phi0)?;

        finalize(&mut disk, setup);
        Ok(disk)
    }
}


// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cosmology::{AnyAccretionHistory, ConstantAccretion, Cosmology};
    use crate::dimensions::Scales;
    use crate::mesh::Mesh;
    use crate::stability;
    use crate::state::tests::test_params;

    fn setup(nx: usize) -> Setup {
        let cosmic = Cosmology { omega_m: 0.266, omega_l: 0.734, hubble: 2.29e-18, z_start: 2.0 }
            .tabulate();
        let tables =
            AnyAccretionHistory::from(ConstantAccretion { mdot_msun_yr: 2.35, mh0: 1.0e12 })
                .tabulate(&cosmic);
        let dims = Scales { radius_kpc: 20.0, vphi_per_mh12_kms: 220.0 }
            .resolve(1.0e12, tables.mdot_ext0_cgs());
        let geom = Mesh {
            num_cells: nx,
            x_min: 0.01,
            inner_power_law: 0.0,
            turnover_radius: 0.0,
            softening: 2.0,
            refine: 2,
        }
        .geometry();
        Setup { geom, dims, cosmic, accretion: tables }
    }

    #[test]
    fn initial_disk_sits_at_the_fixed_q() {
        let s = setup(50);
        let model = UniformRatio { fg0: 0.5, phi0: 1.0 };
        model.validate().unwrap();
        let disk = model.build(test_params(), &s).unwrap();
        let chi = s.dims.chi();
        for i in (0..50).step_by(7) {
            let q = stability::q_romeo_wiegert(&stability::q_params(&disk, &s.geom, chi, i));
            assert!((q - disk.params.fixed_q).abs() < 1e-8, "Q[{}] = {}", i, q);
        }
        disk.check_state_vars("init").unwrap();
    }

    #[test]
    fn gas_fraction_matches_the_request_before_rescaling() {
        let s = setup(50);
        let model = UniformRatio { fg0: 0.4, phi0: 1.0 };
        let disk = model.build(test_params(), &s).unwrap();
        // the joint (fixed-phi0) rescaling preserves column densities, so
        // the gas fraction survives EnforceFixedQ exactly
        for i in (0..50).step_by(11) {
            assert!((disk.f_g(i) - 0.4).abs() < 1e-12, "f_g[{}] = {}", i, disk.f_g(i));
        }
    }

    #[test]
    fn both_sequences_start_with_one_population() {
        let s = setup(50);
        let disk = UniformRatio { fg0: 0.5, phi0: 1.0 }.build(test_params(), &s).unwrap();
        assert_eq!(disk.sps_active.len(), 1);
        assert_eq!(disk.sps_passive.len(), 1);
        assert!(disk.initial_gas_mass > 0.0);
        assert!(disk.initial_stellar_mass > 0.0);
        assert!(disk.m_bulge > 0.0);
    }
}
