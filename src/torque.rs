use std::f64::consts::PI;
use crate::derivs;
use crate::mesh::MeshGeometry;
use crate::stability;
use crate::state::Disk;


/**
 * Build the torque-equation coefficients h2 tau'' + h1 tau' + h0 tau = H
 * at every cell from the stability partials and the current forcing. Cells
 * whose forcing would destabilize the disk get their torque held at zero:
 * the row collapses to tau = 0 until the forcing turns favorable and the
 * cell is gravitationally unstable again.
 */
pub fn update_coeffs(
    disk: &mut Disk,
    geom: &MeshGeometry,
    chi: f64,
    lbt: f64,
) -> anyhow::Result<()> {
    let nx = disk.nx;
    let p = disk.params.clone();

    for i in 0..nx {
        let x = geom.x[i];
        let u = geom.u[i];
        let b = geom.beta[i];
        let bp = geom.betap[i];
        let col = disk.col[i];
        let sig = disk.sig[i];
        let dds = geom.ddx(&disk.sig, i);

        disk.h2[i] = disk.dqd_s[i] * (-1.0 / ((b + 1.0) * u * x))
            + disk.dqds[i] * (-sig / (3.0 * (b + 1.0) * col * u * x));

        disk.h1[i] = disk.dqd_s[i] * (b * b + b + x * bp) / ((b + 1.0) * (b + 1.0) * u * x * x)
            + disk.dqds[i]
                * (sig * (b + b * b + x * bp) / (3.0 * (b + 1.0) * (b + 1.0) * col * u * x * x)
                    - 5.0 * dds / (3.0 * (b + 1.0) * col * u * x));

        disk.h0[i] = disk.dqds[i] * u * (b - 1.0) / (3.0 * sig * col * x * x * x);

        let sfr = disk.col_sfr[i];
        let mut hh = p.rf_inst * disk.dqd_s[i] * sfr
            + disk.dqd_s[i] * disk.mass_loading[i] * sfr
            - disk.dqd_s[i] * disk.diffused_dcoldt[i];

        // turbulent dissipation makes the gas colder; the torque must fight
        // it to hold Q fixed. Zero below the thermal floor, where the
        // 1.5-power would go complex.
        if p.sig_th <= sig {
            hh += disk.dqds[i]
                * 2.0
                * PI
                * PI
                * p.eta
                * (1.0 - p.sig_th * p.sig_th / (sig * sig)).powf(1.5)
                * col
                * chi
                * (1.0 + disk.active_col_st(i) / col * sig / disk.active_sig_st_r(i))
                / 3.0;
        }

        for s in 0..disk.sps_active.len() {
            let forming = disk.sps_active[s].is_forming(lbt);
            if forming {
                hh -= disk.sps_active[s].dqd_s[i] * p.rf_inst * sfr;
            }
            let dsigst = derivs::dsigstdt(disk, geom, i, s, lbt);
            let dmig = disk.sps_active[s].migration_rate(i, &disk.yy, geom);
            hh -= disk.sps_active[s].dqds_r[i] * dsigst + disk.sps_active[s].dqd_s[i] * dmig;
        }

        disk.hh[i] = hh;

        // torque shutoff bookkeeping
        if disk.keep_torque_off[i] == 0 && disk.hh[i] < 0.0 {
            disk.keep_torque_off[i] = 1;
        }
        if disk.keep_torque_off[i] == 1 && disk.hh[i] >= 0.0 {
            let params = stability::q_params(disk, geom, chi, i);
            let mut eval = disk.q_eval.clone();
            if stability::q_of(&params, &mut eval) <= p.fixed_q {
                disk.keep_torque_off[i] = 0;
            }
            disk.q_eval = eval;
        }
        if disk.keep_torque_off[i] == 1 {
            disk.hh[i] = 0.0;
            disk.h2[i] = 0.0;
            disk.h1[i] = 0.0;
            disk.h0[i] = 1.0;
        }

        if !disk.hh[i].is_finite()
            || !disk.h0[i].is_finite()
            || !disk.h1[i].is_finite()
            || !disk.h2[i].is_finite()
        {
            anyhow::bail!(
                "ill-posed torque coefficients at cell {}: H={} h0={} h1={} h2={} col={} sig={} dQdS={} dQds={}",
                i, disk.hh[i], disk.h0[i], disk.h1[i], disk.h2[i], col, sig,
                disk.dqd_s[i], disk.dqds[i]
            );
        }
    }
    Ok(())
}


/**
 * Solve the torque equation on cells [lo, hi] with tau(inner) = ibc and
 * tau'(outer) = obc, by assembling the second-order logarithmic stencil
 * into a tridiagonal system. The boundary conditions fold into the first
 * and last rows. Results land in disk.tau, and tau'/tau'' follow by the
 * matching finite differences.
 */
pub fn compute_gi_torque(
    disk: &mut Disk,
    geom: &MeshGeometry,
    lo: usize,
    hi: usize,
    ibc: f64,
    obc: f64,
) -> anyhow::Result<()> {
    assert!(hi < disk.nx && lo < hi);
    let m = hi - lo + 1;
    let (dm1, dmm1, dmdinv, sqd) = (geom.dm1, geom.dmm1, geom.dmdinv, geom.sqd);

    let sub_c = |disk: &Disk, i: usize| {
        let x = geom.x[i];
        disk.h2[i] / (x * x * dmm1 * dmm1 * sqd) - disk.h1[i] / (x * dmdinv)
    };
    let sup_c = |disk: &Disk, i: usize| {
        let x = geom.x[i];
        disk.h2[i] * sqd / (x * x * dm1 * dm1) + disk.h1[i] / (x * dmdinv)
    };
    let diag_c = |disk: &Disk, i: usize| {
        let x = geom.x[i];
        disk.h0[i] - disk.h2[i] / (x * x) * (sqd / (dm1 * dm1) + 1.0 / (sqd * dmm1 * dmm1))
    };

    {
        let s = &mut disk.scratch;
        for r in 0..m {
            s.sub[r] = 0.0;
            s.diag[r] = 0.0;
            s.sup[r] = 0.0;
            s.rhs[r] = 0.0;
            s.sol[r] = 0.0;
        }
    }
    for i in lo..=hi {
        let r = i - lo;
        let diag = diag_c(disk, i);
        let sub = sub_c(disk, i);
        let sup = sup_c(disk, i);
        let s = &mut disk.scratch;
        s.diag[r] = diag;
        s.rhs[r] = disk.hh[i];
        if r > 0 {
            s.sub[r] = sub;
        }
        if r < m - 1 {
            s.sup[r] = sup;
        }
    }

    // inner boundary: tau(lo-1/2) = ibc folds into the forcing
    let sub_lo = sub_c(disk, lo);
    disk.scratch.rhs[0] -= ibc * sub_lo;

    // outer boundary: tau'(hi) = obc eliminates the ghost cell
    let sup_hi = sup_c(disk, hi);
    let x_hi = geom.x[hi];
    disk.scratch.rhs[m - 1] -= obc * x_hi * dmdinv * sup_hi;
    if m >= 2 {
        let fold = disk.h2[hi] / (x_hi * x_hi) * (sqd / (dm1 * dm1) + 1.0 / (sqd * dmm1 * dmm1));
        disk.scratch.sub[m - 1] = fold;
    }

    {
        let s = &mut disk.scratch;
        s.ws
            .solve(&s.sub[..m], &s.diag[..m], &s.sup[..m], &s.rhs[..m], &mut s.sol[..m])
            .map_err(|e| anyhow::anyhow!("torque solve failed on [{}, {}]: {}", lo, hi, e))?;
    }

    for i in lo..=hi {
        disk.tau[i] = disk.scratch.sol[i - lo];
        if !disk.tau[i].is_finite() {
            anyhow::bail!(
                "tridiagonal solver produced a non-finite torque at cell {}: H={} h0={} h1={} h2={}",
                i, disk.hh[i], disk.h0[i], disk.h1[i], disk.h2[i]
            );
        }
    }

    tau_prime_from_tau(disk, geom, lo, hi, ibc, obc)?;

    // plug the solution back into the operator and accumulate the residual
    for i in lo..=hi {
        let res = disk.taupp[i] * disk.h2[i] + disk.taup[i] * disk.h1[i]
            + disk.tau[i] * disk.h0[i]
            - disk.hh[i];
        disk.cumulative_torque_err[i] += res.abs();
    }
    Ok(())
}


/**
 * Reconstruct tau' and tau'' from tau with the stencils the solve used, so
 * the derivative fields obey the same boundary conditions.
 */
pub fn tau_prime_from_tau(
    disk: &mut Disk,
    geom: &MeshGeometry,
    lo: usize,
    hi: usize,
    ibc: f64,
    obc: f64,
) -> anyhow::Result<()> {
    let (dm1, dmm1, dmdinv, sqd, dd) = (geom.dm1, geom.dmm1, geom.dmdinv, geom.sqd, geom.d);

    for i in lo + 1..hi {
        disk.taup[i] = (disk.tau[i + 1] - disk.tau[i - 1]) / (geom.x[i] * dmdinv);
    }
    disk.taup[hi] = obc;
    disk.taup[lo] = (disk.tau[lo + 1] - ibc) / (geom.x[lo] * dmdinv);

    for i in lo + 1..hi {
        let x = geom.x[i];
        disk.taupp[i] = (sqd / (x * x))
            * ((disk.tau[i + 1] - disk.tau[i]) / (dm1 * dm1)
                - (disk.tau[i] - disk.tau[i - 1]) / (dmm1 * dmm1 * dd));
    }
    let x = geom.x[lo];
    disk.taupp[lo] = (sqd / (x * x))
        * ((disk.tau[lo + 1] - disk.tau[lo]) / (dm1 * dm1)
            - (disk.tau[lo] - ibc) / (dmm1 * dmm1 * dd));
    let x = geom.x[hi];
    disk.taupp[hi] =
        obc - (sqd / (x * x)) * (-(disk.tau[hi] - disk.tau[hi - 1]) / (dmm1 * dmm1 * dd));

    for i in lo..=hi {
        if !disk.taup[i].is_finite() || !disk.taupp[i].is_finite() {
            anyhow::bail!(
                "non-finite torque derivative at cell {}: tau=({}, {}, {})",
                i,
                disk.tau[i.saturating_sub(1)],
                disk.tau[i],
                disk.tau[(i + 1).min(hi)]
            );
        }
    }
    Ok(())
}


/**
 * MRI viscosity floor: wherever the alpha-disk torque is more negative
 * than the GI solution, the MRI carries the gas instead. The handoff back
 * to GI is blended over ndecay cells with a Gaussian kernel of width three
 * cells, then tau' and tau'' are rebuilt.
 */
pub fn compute_mri_torque(
    disk: &mut Disk,
    geom: &MeshGeometry,
    ibc: f64,
    obc: f64,
) -> anyhow::Result<()> {
    let alpha = disk.params.alpha_mri;
    if alpha <= 0.0 {
        return Ok(());
    }
    let nx = disk.nx;
    let sig_th = disk.params.sig_th;

    let mut tau_mri = vec![0.0; nx];
    let mut replaced = vec![false; nx];
    for i in 0..nx {
        let x = geom.x[i];
        tau_mri[i] =
            2.0 * PI * x * x * disk.col[i] * alpha * sig_th * disk.sig[i] * (geom.beta[i] - 1.0);
        if tau_mri[i] < disk.tau[i] {
            disk.tau[i] = tau_mri[i];
            replaced[i] = true;
        }
    }

    let ndecay = disk.params.ndecay as usize;
    if ndecay > 0 {
        const KERNEL_WIDTH: f64 = 3.0;
        for i in 0..nx {
            if !replaced[i] {
                continue;
            }
            for k in 1..=ndecay {
                let j = i + k;
                if j >= nx || replaced[j] {
                    break;
                }
                let w = (-((k * k) as f64) / (2.0 * KERNEL_WIDTH * KERNEL_WIDTH)).exp();
                disk.tau[j] = w * tau_mri[j] + (1.0 - w) * disk.tau[j];
            }
        }
    }

    tau_prime_from_tau(disk, geom, 0, nx - 1, ibc, obc)
}
