use serde::{Serialize, Deserialize};
use std::f64::consts::PI;
use crate::dimensions::{CM_PER_KPC, MSOL, Z_SOL_FE, Z_SOL_O};
use crate::models::{finalize, InitialModel};
use crate::stability::enforce_fixed_q;
use crate::stars::{old_ith_bin, young_ith_bin, StellarPop};
use crate::state::{Disk, DiskParams};
use crate::stepper::Setup;


/**
 * Exponential stellar disk with a user-set dispersion: the stellar surface
 * density follows exp(-x/x_d) with its normalization set by the halo mass
 * and the cooled baryon fraction, and the gas relaxes around it. Where the
 * requested dispersion would leave Q_* below Q_lim, the stars are heated
 * (never lightened) from the minimum outward and monotonized toward the
 * center.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExponentialDisk {

    /// Fraction of the halo baryons that have cooled into the disk
    pub fcool: f64,

    /// Initial gas fraction
    pub fg0: f64,

    /// Initial stellar velocity dispersion [vphiR]
    pub sig_st0: f64,

    /// Stellar scale length [kpc]
    pub scale_length_kpc: f64,
}


// ============================================================================
impl InitialModel for ExponentialDisk {

    fn validate(&self) -> anyhow::Result<()> {
        if !(self.fcool > 0.0 && self.fcool <= 1.0) {
            anyhow::bail!("fcool must lie in (0, 1]")
        }
        if !(self.fg0 > 0.0 && self.fg0 < 1.0) {
            anyhow::bail!("fg0 must lie in (0, 1) for an exponential stellar disk")
        }
        if self.sig_st0 <= 0.0 {
            anyhow::bail!("sig_st0 must be positive")
        }
        if self.scale_length_kpc <= 0.0 {
            anyhow::bail!("scale_length_kpc must be positive")
        }
        Ok(())
    }

    fn build(&self, params: DiskParams, setup: &Setup) -> anyhow::Result<Disk> {
        let geom = &setup.geom;
        let dims = &setup.dims;
        let nx = geom.nx;
        let chi = dims.chi();
        let lbt_start = setup.cosmic.lbt_start();
        let z_start = setup.cosmic.z_start();

        let mut disk = Disk::new(params, nx);
        let p = disk.params.clone();

        let mut active = StellarPop::new(
            nx,
            young_ith_bin(0, lbt_start, p.n_active),
            old_ith_bin(0, lbt_start, p.n_active),
        );
        active.age_at_z0 = lbt_start;

        let qst_of = |i: usize, col_st: f64, sig_st: f64| {
            (2.0 * (geom.beta[i] + 1.0)).sqrt() * geom.u[i] * sig_st
                / (col_st * PI * geom.x[i] * chi)
        };

        let mh_zs = setup.accretion.mh_of_z(z_start);
        let xd = self.scale_length_kpc * CM_PER_KPC / dims.radius;
        let s0 = 0.18 * self.fcool * (1.0 - self.fg0) * mh_zs * MSOL / dims.mdot_ext0
            * dims.vphi_r
            / (2.0 * PI * dims.radius)
            * (1.0 / (xd * xd));

        let z_o = 0.1 * Z_SOL_O;
        let z_fe = 0.1 * Z_SOL_FE;
        let mut low_qst = false;
        let mut max_sig = 0.0;
        let mut max_sig_cell = 0;
        for i in 0..nx {
            disk.z_o[i] = z_o;
            disk.z_fe[i] = z_fe;

            active.col[i] = s0 * (-geom.x[i] / xd).exp();
            active.sig_r[i] = self.sig_st0.max(p.min_sig_st);
            // heat (never lighten) the stars wherever the request leaves
            // them below Q_lim
            if qst_of(i, active.col[i], active.sig_r[i]) < p.q_lim {
                low_qst = true;
                active.sig_r[i] = (p.q_lim * PI * geom.x[i] * active.col[i] * chi
                    / ((2.0 * (geom.beta[i] + 1.0)).sqrt() * geom.u[i]))
                    .max(p.min_sig_st);
            }
            if active.sig_r[i] > max_sig {
                max_sig = active.sig_r[i];
                max_sig_cell = i;
            }
            active.z_o[i] = z_o;
            active.z_fe[i] = z_fe;

            disk.sig[i] = (chi / (p.eta * self.fg0)).powf(1.0 / 3.0) / 2.0_f64.sqrt();
            disk.col[i] = ((p.thickness / p.fixed_q) * geom.u[i]
                * (2.0 * (geom.beta[i] + 1.0)).sqrt()
                / (PI * chi * geom.x[i])
                - active.col[i] / active.sig_r[i])
                * disk.sig[i];

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
                    "non-physical initial state at cell {}: col={} sig={} col_st={} sig_st={} Q_st={}",
                    i,
                    disk.col[i],
                    disk.sig[i],
                    active.col[i],
                    active.sig_r[i],
                    qst_of(i, active.col[i], active.sig_r[i])
                );
            }
        }

        if low_qst {
            // sig_st must rise monotonically toward the center
            for i in 0..=max_sig_cell {
                if active.sig_r[i] < max_sig {
                    active.sig_r[i] = max_sig.max(p.min_sig_st);
                }
            }
        }

        let mut min_qst = f64::MAX;
        let mut min_qst_cell = 0;
        for i in 0..nx {
            let q = qst_of(i, active.col[i], active.sig_r[i]);
            if q < min_qst {
                min_qst = q;
                min_qst_cell = i;
            }
        }
        if min_qst < p.q_lim * 0.99999 {
            anyhow::bail!(
                "minimum Q_* = {} at cell {} is below Q_lim = {} after initialization",
                min_qst, min_qst_cell, p.q_lim
            );
        }
        for i in 0..=min_qst_cell {
            active.col[i] = (2.0 * (geom.beta[i] + 1.0)).sqrt() * geom.u[i] * active.sig_r[i]
                / (min_qst * PI * geom.x[i] * chi);
        }
        for i in 0..nx {
            active.sig_r[i] = (active.sig_r[i] * p.q_lim / min_qst).max(p.min_sig_st);
        }
        for i in 0..nx {
            active.sig_z[i] = active.sig_r[i];
        }

        let mut passive = active.clone();
        passive.youngest = young_ith_bin(0, lbt_start, p.n_passive);
        passive.oldest = old_ith_bin(0, lbt_start, p.n_passive);
        disk.sps_active.push(active);
        disk.sps_passive.push(passive);

        // the stellar dispersion is prescribed here, so only the gas varies
        enforce_fixed_q(&mut disk, geom, chi, false)?;

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

    fn model() -> ExponentialDisk {
        ExponentialDisk { fcool: 0.3, fg0: 0.5, sig_st0: 0.2, scale_length_kpc: 5.0 }
    }

    #[test]
    fn stellar_profile_is_exponential_with_the_requested_scale() {
        let s = setup(60);
        let disk = model().build(test_params(), &s).unwrap();
        let sp = &disk.sps_active[0];
        let xd = 5.0 * CM_PER_KPC / s.dims.radius;
        // cells well outside the rescaled region inside the Q_* minimum
        let (i, j) = (50, 55);
        let expect = ((s.geom.x[j] - s.geom.x[i]) / xd).exp();
        assert!(
            (sp.col[j] / sp.col[i] * expect - 1.0).abs() < 1e-10,
            "profile ratio {} vs e^-dx/xd {}",
            sp.col[j] / sp.col[i],
            1.0 / expect
        );
    }

    #[test]
    fn stellar_disk_is_stable_and_gas_holds_fixed_q() {
        let s = setup(60);
        let disk = model().build(test_params(), &s).unwrap();
        let chi = s.dims.chi();
        let mut min_qst = f64::MAX;
        for i in 0..60 {
            min_qst = min_qst.min(stability::q_stars(&disk, &s.geom, chi, i));
        }
        assert!(min_qst > disk.params.q_lim * (1.0 - 1.0e-5), "min Q_* = {}", min_qst);
        for i in (0..60).step_by(13) {
            let q = stability::q_romeo_wiegert(&stability::q_params(&disk, &s.geom, chi, i));
            assert!((q - disk.params.fixed_q).abs() < 1e-6, "Q[{}] = {}", i, q);
        }
        disk.check_state_vars("init").unwrap();
    }

    #[test]
    fn dispersion_is_monotone_toward_the_center_when_heated() {
        let s = setup(60);
        // a colder, heavier stellar disk forces the Q_* floor to engage
        let m = ExponentialDisk { fcool: 0.8, fg0: 0.3, sig_st0: 0.01, scale_length_kpc: 2.0 };
        match m.build(test_params(), &s) {
            Ok(disk) => {
                let sp = &disk.sps_active[0];
                let mut max_cell = 0;
                for i in 0..60 {
                    if sp.sig_r[i] > sp.sig_r[max_cell] {
                        max_cell = i;
                    }
                }
                for i in 0..max_cell {
                    assert!(
                        sp.sig_r[i] >= sp.sig_r[max_cell] * (1.0 - 1.0e-12),
                        "sig_st not monotone at cell {}",
                        i
                    );
                }
            }
            Err(e) => {
                // a configuration this extreme may legitimately leave no
                // room for the gas; the failure must say so
                let msg = e.to_string();
                assert!(msg.contains("non-physical initial state"), "unexpected error: {}", msg);
            }
        }
    }
}
