use std::f64::consts::PI;
use crate::dimensions::{Dimensions, Z_SOL};
use crate::mesh::MeshGeometry;
use crate::state::Disk;


/// Slope limiter for the metallicity gradient: zero across a sign change,
/// otherwise the shallower of the two one-sided slopes
fn minmod(l: f64, r: f64) -> f64 {
    if l * r <= 0.0 {
        0.0
    } else if l.abs() < r.abs() {
        l
    } else {
        r
    }
}


/**
 * Molecular fraction from the Krumholz & Dekel (2011) approximation, as a
 * function of the local column density and metallicity, clamped at 0.03.
 */
pub fn h2_fraction(disk: &Disk, dims: &Dimensions, i: usize) -> anyhow::Result<f64> {
    let z0 = (disk.z_o[i] + disk.z_fe[i]) / Z_SOL;
    let sig0 = dims.col_cgs(disk.col[i]);
    let ch = 3.1 * (1.0 + 3.1 * z0.powf(0.365)) / 4.1;
    let tauc = 320.0 * 5.0 * sig0 * z0;
    let ss = (1.0 + 0.6 * ch + 0.01 * ch * ch).ln() / (0.6 * tauc);
    let mut val = 1.0 - 0.75 * ss / (1.0 + 0.25 * ss);
    if val < 0.03 {
        val = 0.03;
    }
    if !(0.0..=1.0).contains(&val) || !val.is_finite() {
        anyhow::bail!(
            "non-physical H2 fraction {} at cell {}: ch={} tauc={} ss={} Z_O={} col={}",
            val, i, ch, tauc, ss, disk.z_o[i], disk.col[i]
        );
    }
    Ok(val)
}


/**
 * Fill the star-formation rate, molecular fraction, and mass-loading
 * profiles. Runs before the torque coefficients, which consume all three.
 */
pub fn compute_star_formation(
    disk: &mut Disk,
    dims: &Dimensions,
    mh: f64,
) -> anyhow::Result<()> {
    let chi = dims.chi();
    let p = disk.params.clone();
    for i in 0..disk.nx {
        let fh2 = h2_fraction(disk, dims, i)?;
        disk.f_h2[i] = fh2;

        let col = disk.col[i];
        let sig = disk.sig[i];
        let col_st = disk.active_col_st(i);
        let sig_st = disk.active_sig_st_r(i);
        let sfr = fh2
            * 2.0
            * PI
            * p.eps_ff
            * PI.sqrt()
            * chi
            * col
            * col
            / sig
            * (1.0 + col_st / col * sig / sig_st).sqrt()
            * (32.0 / (3.0 * PI)).sqrt();
        if sfr < 0.0 || !sfr.is_finite() {
            anyhow::bail!(
                "error computing the star formation rate at cell {}: sfr={} fH2={} col={} sig={}",
                i, sfr, fh2, col, sig
            );
        }
        disk.col_sfr[i] = sfr;

        disk.mass_loading[i] = p.mass_loading_factor
            * dims.col_cgs(col).powf(p.mlf_col_scaling)
            * disk.f_g(i).powf(p.mlf_fg_scaling)
            * (mh / 1.0e12).powf(p.mlf_mh_scaling);
    }
    Ok(())
}


/**
 * Rate of change of the radial dispersion of active population s at cell
 * i: migration moves kinetic energy with the stars, and while the bin is
 * forming, newly born stars are injected at the gas's non-thermal
 * dispersion (or the floor).
 */
pub fn dsigstdt(disk: &Disk, geom: &MeshGeometry, i: usize, s: usize, lbt: f64) -> f64 {
    let p = &disk.params;
    let sp = &disk.sps_active[s];
    if sp.col[i] <= 0.0 {
        return 0.0;
    }
    let mut val = 0.0;
    if i < disk.nx - 1 {
        let sigp2 = (2.0 / 3.0) * (geom.psi[i + 1] - geom.psi[i])
            + (1.0 / 3.0) * (geom.u[i + 1] * geom.u[i + 1] - geom.u[i] * geom.u[i])
            + sp.sig_r[i + 1] * sp.sig_r[i + 1];
        val = -2.0 * PI / (2.0 * geom.x[i] * geom.x[i] * geom.dlnx * sp.col[i] * sp.sig_r[i])
            * (geom.x[i + 1]
                * disk.yy[i + 1]
                * sp.col[i + 1]
                * (sigp2 - sp.sig_r[i] * sp.sig_r[i]));
    }
    if sp.is_forming(lbt) {
        let sig2 = disk.sig[i] * disk.sig[i];
        let injected2 = if p.sig_th * p.sig_th + p.min_sig_st * p.min_sig_st <= sig2 {
            sig2 - p.sig_th * p.sig_th
        } else {
            p.min_sig_st * p.min_sig_st
        };
        val += (injected2 - sp.sig_r[i] * sp.sig_r[i]) * p.rf_inst * disk.col_sfr[i]
            / (2.0 * sp.col[i] * sp.sig_r[i]);
    }
    val
}


/**
 * Time derivatives of the gas state at every cell, given the torque
 * profile. The continuity equation moves mass with tau'', the dispersion
 * equation balances shear heating against turbulent dissipation, and the
 * metallicities advect with tau' while star formation enriches them.
 */
pub fn compute_derivs(
    disk: &mut Disk,
    geom: &MeshGeometry,
    dims: &Dimensions,
    acc_rate: f64,
) -> anyhow::Result<()> {
    let nx = disk.nx;
    let chi = dims.chi();
    let p = disk.params.clone();

    for i in 0..nx {
        let x = geom.x[i];
        let u = geom.u[i];
        let b = geom.beta[i];
        let bp = geom.betap[i];
        let col = disk.col[i];
        let sig = disk.sig[i];

        // dlnZ/dx with one-sided slopes at the boundaries; the innermost
        // left slope is the original code's 1/x stand-in for (1/Z)(Z-0)/x
        let grad = |z: &ndarray::Array1<f64>, z_igm: f64| {
            let (l, r);
            if i == 0 {
                l = 1.0 / geom.x[0];
                r = (z[1].ln() - z[0].ln()) / (geom.x[1] - geom.x[0]);
            } else if i == nx - 1 {
                r = (z_igm.ln() - z[nx - 1].ln()) / (x * geom.dlnx);
                l = (z_igm.ln() - z[nx - 2].ln()) / (2.0 * x * geom.dlnx);
            } else {
                l = (z[i].ln() - z[i - 1].ln()) / (geom.x[i] - geom.x[i - 1]);
                r = (z[i + 1].ln() - z[i].ln()) / (geom.x[i + 1] - geom.x[i]);
            }
            minmod(l, r)
        };
        let dlnzo_dx = grad(&disk.z_o, p.z_igm_o);
        let dlnzfe_dx = grad(&disk.z_fe, p.z_igm_fe);

        // tau'' estimated from the slope of tau', one-sided at the ends
        let mut taupp = geom.ddx(&disk.taup, i);
        if !taupp.is_finite() {
            eprintln!(
                "WARNING: torque equation may be ill-posed at cell {}: tau={} tau'={} H={} h0={} h1={} h2={}",
                i, disk.tau[i], disk.taup[i], disk.hh[i], disk.h0[i], disk.h1[i], disk.h2[i]
            );
            taupp = 0.0;
        }

        let sfr = disk.col_sfr[i];
        disk.dcoldt[i] = -taupp / ((b + 1.0) * u * x)
            + (b * b + b + x * bp) * disk.taup[i] / ((b + 1.0) * (b + 1.0) * u * x * x)
            - p.rf_inst * sfr
            - disk.mass_loading[i] * sfr
            + p.recycle_rate * disk.active_col_st(i);

        let mut dsigdt = u * (b - 1.0) * disk.tau[i] / (3.0 * sig * col * x * x * x)
            + (sig * (b + b * b + x * bp)
                / (3.0 * (b + 1.0) * (b + 1.0) * col * u * x * x)
                - 5.0 * geom.ddx(&disk.sig, i) / (3.0 * (b + 1.0) * col * u * x))
                * disk.taup[i]
            - sig * taupp / (3.0 * (b + 1.0) * col * u * x);
        if p.sig_th <= sig {
            dsigdt -= 2.0 * PI * PI
                * p.eta
                * (1.0 - p.sig_th * p.sig_th / (sig * sig)).powf(1.5)
                * col
                * chi
                * (1.0 + disk.active_col_st(i) / col * sig / disk.active_sig_st_r(i))
                / 3.0;
        }
        if p.accretion_heating > 0.0 && i == nx - 1 && acc_rate > 0.0 {
            // gas landing on the outer edge arrives stirred to a fraction
            // of the circular speed
            let col_acc = acc_rate / (x * x * geom.dlnx);
            let arriving2 = p.accretion_heating * p.accretion_heating * u * u;
            dsigdt += col_acc * (arriving2 - sig * sig) / (2.0 * col * sig);
        }
        disk.dsigdt[i] = dsigdt;

        let advect = -disk.z_o[i] * dlnzo_dx * disk.taup[i] / ((b + 1.0) * x * col * u);
        disk.dzodt[i] = advect + p.y_o * (1.0 - p.rf_inst) * p.zeta * sfr / col;
        let advect_fe = -disk.z_fe[i] * dlnzfe_dx * disk.taup[i] / ((b + 1.0) * x * col * u);
        disk.dzfedt[i] = advect_fe + p.y_fe * (1.0 - p.rf_inst) * p.zeta * sfr / col;

        if !disk.dcoldt[i].is_finite()
            || !disk.dsigdt[i].is_finite()
            || !disk.dzodt[i].is_finite()
            || !disk.dzfedt[i].is_finite()
        {
            anyhow::bail!(
                "error computing derivatives at cell {}: dcoldt={} dsigdt={} dZdt=({}, {}) tau={} tau'={} col={} sig={} tau''={}",
                i, disk.dcoldt[i], disk.dsigdt[i], disk.dzodt[i], disk.dzfedt[i],
                disk.tau[i], disk.taup[i], col, sig, taupp
            );
        }
    }
    Ok(())
}
