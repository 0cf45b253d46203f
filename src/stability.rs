use std::f64::consts::PI;
use crate::mesh::MeshGeometry;
use crate::numerics::bessel::{i0_scaled, i1_scaled};
use crate::numerics::brent::{find_root, min_from_deriv};
use crate::numerics::deriv::ridders;
use crate::state::Disk;


/**
 * The two ways of evaluating the stability parameter. The numerical
 * (Rafikov 2001) variant carries the abscissa of its last minimum so each
 * evaluation warm-starts from the previous one.
 */
#[derive(Clone, Debug)]
pub enum QEval {
    Analytic,
    Numerical { most_recent_q: f64 },
}


// Everything Q needs at one cell: the gas Q, one (Q_*, sigma_*/sigma_g)
// pair per active stellar component, and the thickness corrections.
#[derive(Clone)]
pub struct QParams {
    pub qg: f64,
    pub qsi: Vec<f64>,
    pub ri: Vec<f64>,
    pub thick_gas: f64,
    pub thick_stars: f64,
    pub fixed_q: f64,
}


// ============================================================================
/// Gas Toomre parameter at cell i (thickness-free)
pub fn q_gas(disk: &Disk, geom: &MeshGeometry, chi: f64, i: usize) -> f64 {
    (2.0 * (geom.beta[i] + 1.0)).sqrt() * geom.u[i] * disk.sig[i]
        / (PI * chi * geom.x[i] * disk.col[i])
}

/// Stellar Toomre parameter at cell i from the summed active populations
pub fn q_stars(disk: &Disk, geom: &MeshGeometry, chi: f64, i: usize) -> f64 {
    (2.0 * (geom.beta[i] + 1.0)).sqrt() * geom.u[i] * disk.active_sig_st_r(i)
        / (PI * chi * geom.x[i] * disk.active_col_st(i))
}

/**
 * Assemble the Q inputs for one cell. The stellar thickness correction
 * follows Romeo-Wiegert: 0.8 + 0.7 sigma_z/sigma_R of the active stars.
 */
pub fn q_params(disk: &Disk, geom: &MeshGeometry, chi: f64, i: usize) -> QParams {
    let pre = (2.0 * (geom.beta[i] + 1.0)).sqrt() * geom.u[i] / (PI * chi * geom.x[i]);
    let qsi = disk
        .sps_active
        .iter()
        .map(|sp| pre * sp.sig_r[i] / sp.col[i])
        .collect();
    let ri = disk.sps_active.iter().map(|sp| sp.sig_r[i] / disk.sig[i]).collect();
    let sig_r = disk.active_sig_st_r(i);
    let sig_z = disk.active_sig_st_z(i);
    QParams {
        qg: pre * disk.sig[i] / disk.col[i],
        qsi,
        ri,
        thick_gas: disk.params.thickness,
        thick_stars: 0.8 + 0.7 * sig_z / sig_r,
        fixed_q: disk.params.fixed_q,
    }
}


// ============================================================================
/**
 * Thickness-corrected two-component Q of Romeo & Wiegert (2011), with the
 * multiple stellar components first collapsed onto an effective (Q_*, r_s).
 */
pub fn q_romeo_wiegert(p: &QParams) -> f64 {
    if p.qsi.is_empty() {
        return p.qg * p.thick_gas;
    }
    let mut qsinv_ri3 = 0.0;
    let mut qsinv_ri = 0.0;
    for i in 0..p.qsi.len() {
        qsinv_ri3 += p.ri[i] * p.ri[i] * p.ri[i] / p.qsi[i];
        qsinv_ri += p.ri[i] / p.qsi[i];
    }
    let rs = (qsinv_ri3 / qsinv_ri).sqrt();
    let qst = rs / qsinv_ri;
    let w = 2.0 / (rs + 1.0 / rs);

    if qst * p.thick_stars > p.qg * p.thick_gas {
        1.0 / (w / (qst * p.thick_stars) + 1.0 / (p.qg * p.thick_gas))
    } else {
        1.0 / (1.0 / (qst * p.thick_stars) + w / (p.qg * p.thick_gas))
    }
}


/**
 * The Rafikov (2001) marginal-stability function Q(q) at dimensionless
 * wavenumber q. Q is its minimum over q > 0.
 */
pub fn qq(q: f64, p: &QParams) -> f64 {
    if q <= 0.0 {
        // keeps the minimizer from wandering across q = 0
        return 1.0e30;
    }
    let mut sum = 0.0;
    for i in 0..p.qsi.len() {
        let qr = q * p.ri[i];
        sum += (1.0 / p.qsi[i]) * (1.0 - i0_scaled(qr * qr)) / qr;
    }
    1.0 / (2.0 / p.qg * q / (1.0 + q * q) + 2.0 * sum)
}


/// dQ(q)/dq for the Rafikov function; its roots locate the extrema
pub fn dqdq(q: f64, p: &QParams) -> f64 {
    let mut sum = 0.0;
    let mut sum2 = 0.0;
    for i in 0..p.qsi.len() {
        let r = p.ri[i];
        let i0e = i0_scaled(q * q * r * r);
        let i1e = i1_scaled(q * q * r * r);
        sum += (1.0 / p.qsi[i]) * (1.0 - i0e) / (q * r);
        sum2 += (2.0 * i0e * r - 2.0 * i1e * r) / p.qsi[i];
    }
    let denom_part = q / (p.qg * (1.0 + q * q)) + sum;
    -((1.0 - q * q) / ((1.0 + q * q) * (1.0 + q * q) * p.qg) - sum / q + sum2)
        / (2.0 * denom_part * denom_part)
}


/**
 * Numerical Q: minimize the Rafikov function over q, warm-starting from
 * (and updating) the cached abscissa.
 */
pub fn q_rafikov(p: &QParams, abscissa: &mut f64) -> f64 {
    if *abscissa <= 0.0 {
        *abscissa = 1.0;
    }
    match min_from_deriv(|q| dqdq(q, p), |q| qq(q, p), abscissa) {
        Some(min) => p.thick_gas * min,
        None => -p.thick_gas,
    }
}


/// Q in whichever mode the disk is configured for
pub fn q_of(p: &QParams, eval: &mut QEval) -> f64 {
    match eval {
        QEval::Analytic => q_romeo_wiegert(p),
        QEval::Numerical { most_recent_q } => q_rafikov(p, most_recent_q),
    }
}


// ============================================================================
/**
 * Q(state rescaled by s) - Q_f, where s multiplies every velocity
 * dispersion jointly (the r_i stay put while the Q's scale).
 */
fn qmf_q(p: &mut QParams, s: f64, eval: &mut QEval) -> f64 {
    p.qg *= s;
    for q in p.qsi.iter_mut() {
        *q *= s;
    }
    let val = q_of(p, eval) - p.fixed_q;
    p.qg /= s;
    for q in p.qsi.iter_mut() {
        *q /= s;
    }
    val
}

/**
 * Same, but only the gas dispersion varies; the stars are held fixed, so
 * the ratios r_i shrink as s grows.
 */
fn qmf_q_fst(p: &mut QParams, s: f64, eval: &mut QEval) -> f64 {
    p.qg *= s;
    for r in p.ri.iter_mut() {
        *r /= s;
    }
    let val = q_of(p, eval) - (p.fixed_q - 1.0e-12);
    p.qg /= s;
    for r in p.ri.iter_mut() {
        *r *= s;
    }
    val
}


/**
 * Rescale the velocity dispersions cell by cell until Q = Q_f everywhere.
 * With fixed_phi0 the gas and stellar dispersions vary jointly; when the
 * joint factor would push a stellar dispersion below its floor, that cell
 * falls back to gas-only rescaling with a warning.
 */
pub fn enforce_fixed_q(
    disk: &mut Disk,
    geom: &MeshGeometry,
    chi: f64,
    fixed_phi0: bool,
) -> anyhow::Result<()> {
    let min_sig_st = disk.params.min_sig_st;
    for i in 0..disk.nx {
        let mut p = q_params(disk, geom, chi, i);
        let mut eval = disk.q_eval.clone();
        let mut factor = 1.0;

        let mut joint = fixed_phi0;
        if joint {
            find_root(|s| qmf_q(&mut p, s, &mut eval), &mut factor).map_err(|e| {
                anyhow::anyhow!("EnforceFixedQ failed to bracket at cell {}: {}", i, e)
            })?;
            let violates = disk
                .sps_active
                .iter()
                .chain(disk.sps_passive.iter())
                .any(|sp| sp.sig_r[i] * factor < min_sig_st || sp.sig_z[i] * factor < min_sig_st);
            if violates {
                eprintln!(
                    "WARNING: joint rescaling at cell {} would violate the stellar dispersion floor; \
                     rescaling the gas only",
                    i
                );
                joint = false;
                factor = 1.0;
            }
        }
        if !joint {
            find_root(|s| qmf_q_fst(&mut p, s, &mut eval), &mut factor).map_err(|e| {
                anyhow::anyhow!("EnforceFixedQ failed to bracket at cell {}: {}", i, e)
            })?;
        }

        disk.sig[i] *= factor;
        if joint {
            for sp in disk.sps_active.iter_mut().chain(disk.sps_passive.iter_mut()) {
                sp.sig_r[i] = (sp.sig_r[i] * factor).max(min_sig_st);
                sp.sig_z[i] = (sp.sig_z[i] * factor).max(min_sig_st);
            }
        }
        disk.q_eval = eval;
    }
    Ok(())
}


// ============================================================================
/**
 * Evaluate Q with one of its inputs replaced by sv: var 0 is Q_g, the next
 * n are the Q_*_i, the n after that the r_i. The backbone of the numerical
 * partial derivatives.
 */
fn var_q(p: &mut QParams, var: usize, sv: f64, eval: &mut QEval) -> f64 {
    let n = p.qsi.len();
    if var == 0 {
        let saved = p.qg;
        p.qg = sv;
        let val = q_of(p, eval);
        p.qg = saved;
        val
    } else if var <= n {
        let saved = p.qsi[var - 1];
        p.qsi[var - 1] = sv;
        let val = q_of(p, eval);
        p.qsi[var - 1] = saved;
        val
    } else if var <= 2 * n {
        let saved = p.ri[var - 1 - n];
        p.ri[var - 1 - n] = sv;
        let val = q_of(p, eval);
        p.ri[var - 1 - n] = saved;
        val
    } else {
        panic!("var_q: variable index {} out of range", var);
    }
}


/**
 * Fill the partial derivatives of Q with respect to every state variable.
 * Analytic mode uses the closed forms of the two-component Romeo-Wiegert
 * Q; numerical mode differentiates the Rafikov Q by Ridders' method and
 * carries the error estimates along.
 */
pub fn compute_partials(disk: &mut Disk, geom: &MeshGeometry, chi: f64) -> anyhow::Result<()> {
    if disk.params.analytic_q {
        compute_partials_analytic(disk, geom, chi)
    } else {
        compute_partials_numerical(disk, geom, chi)
    }
}

fn compute_partials_analytic(disk: &mut Disk, geom: &MeshGeometry, chi: f64) -> anyhow::Result<()> {
    if disk.sps_active.len() > 1 {
        eprintln!(
            "WARNING: analytic partials treat the {} active populations as one component",
            disk.sps_active.len()
        );
    }
    for i in 0..disk.nx {
        let col = disk.col[i];
        let sig = disk.sig[i];
        let col_st = disk.active_col_st(i);
        let sig_st = disk.active_sig_st_r(i);

        let qst = q_stars(disk, geom, chi, i);
        let qg = q_gas(disk, geom, chi, i);

        let s2 = sig * sig;
        let st2 = sig_st * sig_st;

        let (dqd_s, dqds, dqd_s_st, dqds_st);
        if qst > qg {
            let den = (col + 2.0 * col_st) * s2 + col * st2;
            dqd_s = -(col * (s2 + st2).powi(2) / (den * den)) * qg;
            dqds = col * (2.0 * col_st * s2 * (s2 - st2) + col * (s2 + st2).powi(2))
                / (sig * den * den)
                * qg;
            dqd_s_st = -(2.0 * col_st * s2 * sig * (s2 + st2) / (sig_st * den * den)) * qst;
            dqds_st = 4.0 * col_st * col_st * s2 * sig / (den * den) * qst;
        } else {
            let den = col_st * s2 + (2.0 * col + col_st) * st2;
            dqd_s = -2.0 * col * st2 * sig_st * (s2 + st2) * qg / (sig * den * den);
            dqds = 4.0 * col * col * st2 * sig_st / (den * den) * qg;
            dqd_s_st = -(col_st * (s2 + st2).powi(2) / (den * den)) * qst;
            dqds_st = col_st
                * (2.0 * col * st2 * (st2 - s2) + col_st * (s2 + st2).powi(2))
                / (sig_st * den * den)
                * qst;
        }

        if !dqd_s.is_finite() || !dqds.is_finite() || !dqd_s_st.is_finite() || !dqds_st.is_finite()
        {
            anyhow::bail!(
                "error computing partials at cell {}: dQdS={} dQds={} dQdS*={} dQds*={} Qst={} Qg={}",
                i, dqd_s, dqds, dqd_s_st, dqds_st, qst, qg
            );
        }

        disk.dqd_s[i] = dqd_s;
        disk.dqds[i] = dqds;
        disk.dqd_s_err[i] = 0.0;
        disk.dqds_err[i] = 0.0;
        for (s, sp) in disk.sps_active.iter_mut().enumerate() {
            // the single-component forms attribute the whole stellar
            // response to the first population
            let (a, b) = if s == 0 { (dqd_s_st, dqds_st) } else { (0.0, 0.0) };
            sp.dqd_s[i] = a;
            sp.dqds_r[i] = b;
            sp.dqds_z[i] = 0.0;
            sp.dqd_s_err[i] = 0.0;
            sp.dqds_err[i] = 0.0;
        }
    }
    Ok(())
}

fn compute_partials_numerical(disk: &mut Disk, geom: &MeshGeometry, chi: f64) -> anyhow::Result<()> {
    let npop = disk.sps_active.len();
    let nx = disk.nx;

    for i in 0..nx {
        let base = q_params(disk, geom, chi, i);
        let mut eval = disk.q_eval.clone();

        let mut aux = Vec::with_capacity(2 * npop + 1);
        let mut aux_err = Vec::with_capacity(2 * npop + 1);
        for k in 0..=2 * npop {
            let val = if k == 0 {
                base.qg
            } else if k <= npop {
                base.qsi[k - 1]
            } else {
                base.ri[k - 1 - npop]
            };
            let mut p = base.clone();
            let h = (val.abs() * 1.0e-4).max(1.0e-8);
            let (result, error) = ridders(|v| var_q(&mut p, k, v, &mut eval), val, h);
            aux.push(result);
            aux_err.push(error);
        }

        let col = disk.col[i];
        let sig = disk.sig[i];

        disk.dqd_s[i] = aux[0] * (-base.qg / col);
        disk.dqd_s_err[i] = (aux_err[0] * base.qg / col).abs();
        let mut sum = 0.0;
        let mut errsum = 0.0;
        for j in 0..npop {
            sum += aux[j + 1 + npop] * (-base.ri[j] / sig);
            errsum = (errsum * errsum + (aux_err[j + 1 + npop] * base.ri[j] / sig).powi(2)).sqrt();
        }
        disk.dqds[i] = aux[0] * (base.qg / sig) + sum;
        disk.dqds_err[i] = ((aux_err[0] * base.qg / sig).powi(2) + errsum * errsum).sqrt();

        for k in 0..npop {
            let sp = &mut disk.sps_active[k];
            sp.dqd_s[i] = aux[k + 1] * (-base.qsi[k] / sp.col[i]);
            sp.dqds_r[i] = aux[k + 1] * (base.qsi[k] / sp.sig_r[i])
                + aux[k + 1 + npop] * (base.ri[k] / sp.sig_r[i]);
            sp.dqds_z[i] = 0.0;
            sp.dqd_s_err[i] = (aux_err[k + 1] * base.qsi[k] / sp.col[i]).abs();
            sp.dqds_err[i] = ((aux_err[k + 1] * base.qsi[k] / sp.sig_r[i]).powi(2)
                + (aux_err[k + 1 + npop] * base.ri[k] / sp.sig_r[i]).powi(2))
            .sqrt();
        }

        if !disk.dqd_s[i].is_finite() || !disk.dqds[i].is_finite() {
            anyhow::bail!(
                "error computing numerical partials at cell {}: dQdS={} dQds={}",
                i, disk.dqd_s[i], disk.dqds[i]
            );
        }
        disk.q_eval = eval;
    }
    Ok(())
}
