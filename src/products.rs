use std::f64::consts::PI;
use ndarray::Array1;
use crate::dimensions::{Dimensions, SPERYEAR};
use crate::io;
use crate::mesh::MeshGeometry;
use crate::stability;
use crate::stars::StellarPop;
use crate::state::Disk;


/**
 * Append one record each to the radial-profile file and the global
 * time-series file. Every quantity a reader might want per cell goes out
 * in a fixed column order; the record is self-describing through its
 * (n_cols, n_rows) header.
 */
pub fn write_step(
    run_base: &str,
    step: usize,
    t: f64,
    z: f64,
    dt: f64,
    disk: &Disk,
    geom: &MeshGeometry,
    dims: &Dimensions,
) -> anyhow::Result<()> {
    const NCOLS: i32 = 46;
    let nx = disk.nx;
    let chi = dims.chi();
    let p = &disk.params;

    let col_st = Array1::from_iter((0..nx).map(|i| disk.active_col_st(i)));
    let sig_st = Array1::from_iter((0..nx).map(|i| disk.active_sig_st_r(i)));

    let mut file = io::open_record(&format!("{}_radial.dat", run_base), step == 0)?;
    io::put_i32(&mut file, NCOLS)?;
    io::put_i32(&mut file, nx as i32)?;

    let mut mts = vec![0.0; nx];
    let mut bad: Option<(usize, usize)> = None;

    for i in 0..nx {
        let x = geom.x[i];
        let u = geom.u[i];
        let b = geom.beta[i];
        let sig = disk.sig[i];
        let col = disk.col[i];

        let qp = stability::q_params(disk, geom, chi, i);
        let mut eval = disk.q_eval.clone();
        let current_q = stability::q_of(&qp, &mut eval);

        // the Rafikov evaluation also supplies the most unstable
        // wavenumber, worth writing out in either mode
        let mut q_absc = 1.0;
        let q_r = stability::q_rafikov(&qp, &mut q_absc);
        let verify = stability::qq(q_absc, &qp);
        let q_rw = stability::q_romeo_wiegert(&qp);

        let qst = stability::q_stars(disk, geom, chi, i);
        let qg = stability::q_gas(disk, geom, chi, i);
        let q_ws = 1.0 / (1.0 / qg + 1.0 / qst);

        let absc = if q_absc > 0.0 { q_absc } else { 1.0 };
        let lambda_t = 2.0 * PI * sig * x / (absc * (2.0 * (b + 1.0)).sqrt() * u);
        let mt = lambda_t * lambda_t * col;
        mts[i] = mt;

        let torque_err = disk.h2[i] * geom.ddx(&disk.taup, i)
            + disk.h1[i] * disk.taup[i]
            + disk.h0[i] * disk.tau[i]
            - disk.hh[i];
        let vrg = disk.taup[i] / (2.0 * PI * x * u * col * (1.0 + b));
        let alpha = -disk.tau[i] / (2.0 * PI * x * x * sig * sig * col);

        let dcol_stdt = -2.0
            * PI
            * (col_st[i] * geom.ddx(&disk.yy, i) + geom.ddx(&col_st, i) * disk.yy[i]
                + col_st[i] * disk.yy[i] / x)
            + p.rf_inst * disk.col_sfr[i];
        let dsig_stdt = -2.0 * PI * disk.yy[i]
            * ((1.0 + b) * u * u / (3.0 * sig_st[i] * x) + geom.ddx(&sig_st, i))
            + (sig * sig - sig_st[i] * sig_st[i]) * p.rf_inst * disk.col_sfr[i]
                / (2.0 * col_st[i] * sig_st[i]);

        let flux_st: f64 = disk
            .sps_active
            .iter()
            .map(|sp| sp.interface_flux(i, &disk.yy, geom))
            .sum();

        let row = [
            x,
            disk.tau[i],
            disk.taup[i],
            col,
            sig,
            col_st[i],
            sig_st[i],
            disk.dcoldt[i],
            disk.dsigdt[i],
            dcol_stdt,
            dsig_stdt,
            current_q,
            disk.h0[i],
            disk.h1[i],
            disk.h2[i],
            disk.hh[i],
            disk.f_g(i),
            q_absc,
            lambda_t,
            mt,
            disk.dzodt[i],
            disk.z_o[i],
            qst,
            qg,
            q_r,
            q_ws,
            q_rw,
            verify,
            disk.col_sfr[i],
            disk.taupp[i],
            disk.dqd_s[i],
            disk.dqds[i],
            disk.dqd_s_err[i],
            disk.dqds_err[i],
            disk.yy[i],
            torque_err,
            vrg,
            disk.cu_stars_out[i],
            disk.cu_gas_out[i],
            flux_st,
            geom.ddx(&disk.taup, i),
            geom.ddx(&disk.sig, i),
            alpha,
            disk.f_h2[i],
            disk.cumulative_torque_err[i],
            disk.cumulative_sf[i],
        ];
        debug_assert_eq!(row.len(), NCOLS as usize);
        for (k, &v) in row.iter().enumerate() {
            if !v.is_finite() && bad.is_none() {
                bad = Some((k, i));
            }
            io::put_f64(&mut file, v)?;
        }
    }
    drop(file);

    if let Some((k, i)) = bad {
        anyhow::bail!("non-finite value in the radial record: column {}, cell {}", k, i);
    }

    write_evolution(run_base, step, t, z, dt, disk, geom, dims, &mts)?;
    Ok(())
}


fn write_evolution(
    run_base: &str,
    step: usize,
    t: f64,
    z: f64,
    dt: f64,
    disk: &Disk,
    geom: &MeshGeometry,
    dims: &Dimensions,
    mts: &[f64],
) -> anyhow::Result<()> {
    const NCOLS: i32 = 18;
    let mut file = io::open_record(&format!("{}_evolution.dat", run_base), step == 0)?;
    if step == 0 {
        io::put_i32(&mut file, NCOLS)?;
    }

    let gas_mass = disk.total_weighted_by_area(&disk.col, geom);
    let mut total_mass = gas_mass;
    let mut stellar_mass = 0.0;
    for sp in &disk.sps_active {
        let m = disk.total_weighted_by_area(&sp.col, geom);
        total_mass += m;
        stellar_mass += m;
    }
    let mdot_ibc = -disk.taup[0] / (geom.u[0] * (1.0 + geom.beta[0]));
    let max_mt = mts.iter().cloned().fold(0.0, f64::max);
    let sfr_total = disk.total_weighted_by_area(&disk.col_sfr, geom);

    let row = [
        step as f64,
        t,
        dt,
        disk.m_bulge,
        disk.z_bulge_o,
        gas_mass,
        gas_mass / total_mass,
        max_mt,
        mdot_ibc,
        z,
        sfr_total,
        dims.mass_msun(gas_mass) - disk.initial_gas_mass,
        dims.mass_msun(stellar_mass) - disk.initial_stellar_mass,
        disk.cumulative_gas_through_ib,
        disk.cumulative_stars_through_ib,
        disk.cumulative_sf_mass,
        disk.cumulative_mass_accreted,
        disk.cumulative_torque,
    ];
    debug_assert_eq!(row.len(), NCOLS as usize);
    io::put_f64_slice(&mut file, &row)?;
    Ok(())
}


/**
 * Append a record of the stellar population profiles: a small integer
 * header, the radii, then per population the age at z = 0 in years and
 * the column density, dispersion, metallicity, and metallicity spread.
 */
pub fn write_stars(
    run_base: &str,
    step: usize,
    pops: &[StellarPop],
    n_bins: usize,
    geom: &MeshGeometry,
) -> anyhow::Result<()> {
    let mut file = io::open_record(&format!("{}_stars.dat", run_base), step == 0)?;
    io::put_i32(&mut file, (n_bins + 1) as i32)?;
    io::put_i32(&mut file, pops.len() as i32)?;
    io::put_i32(&mut file, geom.nx as i32)?;

    for i in 0..geom.nx {
        io::put_f64(&mut file, geom.x[i])?;
    }
    for sp in pops {
        io::put_f64(&mut file, sp.age_at_z0 / SPERYEAR)?;
        io::put_f64_slice(&mut file, sp.col.as_slice().unwrap())?;
        io::put_f64_slice(&mut file, sp.sig_r.as_slice().unwrap())?;
        io::put_f64_slice(&mut file, sp.z_o.as_slice().unwrap())?;
        for i in 0..geom.nx {
            io::put_f64(&mut file, sp.zv_o[i].sqrt())?;
        }
    }
    Ok(())
}


// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use crate::state::tests::test_params;
    use crate::dimensions::{Scales, MSOL};

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

    #[test]
    fn radial_record_layout_is_self_describing() {
        let nx = 12;
        let g = geom(nx);
        let dims = Scales { radius_kpc: 20.0, vphi_per_mh12_kms: 220.0 }
            .resolve(1.0e12, 2.0 * MSOL / crate::dimensions::SPERYEAR);
        let mut disk = Disk::new(test_params(), nx);
        disk.col.fill(1.0);
        disk.sig.fill(0.05);
        disk.z_o.fill(2.0e-3);
        disk.z_fe.fill(5.0e-4);
        let mut sp = StellarPop::new(nx, 0.0, 1.0e18);
        sp.col.fill(0.5);
        sp.sig_r.fill(0.06);
        sp.sig_z.fill(0.03);
        disk.sps_active.push(sp);

        let tmp = std::env::temp_dir().join("spindle_products_test");
        let base = tmp.to_str().unwrap();
        write_step(base, 0, 0.0, 2.0, 1.0e-4, &disk, &g, &dims).unwrap();
        write_step(base, 1, 1.0e-4, 2.0, 1.0e-4, &disk, &g, &dims).unwrap();

        let bytes = std::fs::read(format!("{}_radial.dat", base)).unwrap();
        let record = 8 + 46 * nx * 8;
        assert_eq!(bytes.len(), 2 * record);
        let ncols = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let nrows = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        assert_eq!(ncols, 46);
        assert_eq!(nrows, nx as i32);
        // first column of the first row is x[0]
        let x0 = f64::from_le_bytes(bytes[8..16].try_into().unwrap());
        assert!((x0 - g.x[0]).abs() < 1e-14);

        let evo = std::fs::read(format!("{}_evolution.dat", base)).unwrap();
        assert_eq!(evo.len(), 4 + 2 * 18 * 8);
    }

    #[test]
    fn stars_record_counts_match_the_header() {
        let nx = 8;
        let g = geom(nx);
        let mut sp = StellarPop::new(nx, 0.0, 1.0e17);
        sp.col.fill(0.3);
        sp.sig_r.fill(0.02);
        sp.age_at_z0 = 3.0e17;
        let pops = vec![sp];

        let tmp = std::env::temp_dir().join("spindle_stars_test");
        let base = tmp.to_str().unwrap();
        write_stars(base, 0, &pops, 10, &g).unwrap();

        let bytes = std::fs::read(format!("{}_stars.dat", base)).unwrap();
        // header + x row + (age + four fields) per population
        let expect = 12 + nx * 8 + 1 * (8 + 4 * nx * 8);
        assert_eq!(bytes.len(), expect);
        assert_eq!(i32::from_le_bytes(bytes[0..4].try_into().unwrap()), 11);
        assert_eq!(i32::from_le_bytes(bytes[4..8].try_into().unwrap()), 1);
        assert_eq!(i32::from_le_bytes(bytes[8..12].try_into().unwrap()), nx as i32);
    }
}
