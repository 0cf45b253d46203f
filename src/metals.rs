use std::f64::consts::PI;
use crate::mesh::MeshGeometry;
use crate::state::Disk;


/// The two tracked metal species
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Species {
    Oxygen,
    Iron,
}


/**
 * One implicit diffusion step for a metal species. The operator acts on
 * the metal mass M_n = Z_n Sigma_n x_n^2 dlnx with zero-flux boundary
 * rows; its columns sum to one, so the total metal mass is conserved to
 * round-off no matter the time step.
 */
pub fn diffuse_metals(
    disk: &mut Disk,
    geom: &MeshGeometry,
    dt: f64,
    species: Species,
) -> anyhow::Result<()> {
    let nx = disk.nx;
    let kappa = disk.params.kappa_metals;
    if kappa <= 0.0 {
        return Ok(());
    }

    // interface weights: eta couples a cell to its outer neighbor, xi the
    // reverse, split so the pair moves metal mass without moving gas
    for k in 0..nx - 1 {
        let dx = geom.x[k + 1] - geom.x[k];
        let sum = 4.0 * PI * kappa / (dx * dx);
        let ratio = geom.x[k + 1] * geom.x[k + 1] * disk.col[k + 1]
            / (geom.x[k] * geom.x[k] * disk.col[k]);
        disk.scratch.eta[k] = sum / (1.0 + ratio);
        disk.scratch.xi[k] = sum * ratio / (1.0 + ratio);
    }

    {
        let z = match species {
            Species::Oxygen => &disk.z_o,
            Species::Iron => &disk.z_fe,
        };
        let s = &mut disk.scratch;
        for j in 0..nx {
            s.rhs[j] = z[j] * disk.col[j] * geom.x[j] * geom.x[j] * geom.dlnx;
            s.sub[j] = if j > 0 { -dt * s.xi[j - 1] } else { 0.0 };
            s.sup[j] = if j < nx - 1 { -dt * s.eta[j] } else { 0.0 };
            let mut diag = 1.0;
            if j < nx - 1 {
                diag += dt * s.xi[j];
            }
            if j > 0 {
                diag += dt * s.eta[j - 1];
            }
            s.diag[j] = diag;
        }
        s.ws
            .solve(&s.sub[..nx], &s.diag[..nx], &s.sup[..nx], &s.rhs[..nx], &mut s.sol[..nx])
            .map_err(|e| anyhow::anyhow!("metal diffusion solve failed: {}", e))?;
    }

    for j in 0..nx {
        let z_new = disk.scratch.sol[j] / (disk.col[j] * geom.x[j] * geom.x[j] * geom.dlnx);
        if !z_new.is_finite() || z_new < 0.0 || z_new > 1.0 {
            anyhow::bail!(
                "error diffusing metals at cell {}: Z={} col={}",
                j, z_new, disk.col[j]
            );
        }
        match species {
            Species::Oxygen => disk.z_o[j] = z_new,
            Species::Iron => disk.z_fe[j] = z_new,
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
    use crate::state::Disk;

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

    fn metal_mass(disk: &Disk, geom: &MeshGeometry) -> f64 {
        (0..disk.nx)
            .map(|i| disk.z_o[i] * disk.col[i] * geom.x[i] * geom.x[i] * geom.dlnx)
            .sum()
    }

    fn gradient_disk(nx: usize, kappa: f64) -> Disk {
        let mut params = test_params();
        params.kappa_metals = kappa;
        let mut disk = Disk::new(params, nx);
        disk.col.fill(1.0);
        disk.sig.fill(0.05);
        for i in 0..nx {
            disk.z_o[i] = 2.0e-3 * (1.0 + 4.0 * (i as f64) / nx as f64);
            disk.z_fe[i] = 5.0e-4;
        }
        disk
    }

    #[test]
    fn zero_kappa_is_the_identity() {
        let g = geom(50);
        let mut disk = gradient_disk(50, 0.0);
        let before = disk.z_o.clone();
        diffuse_metals(&mut disk, &g, 1.0e-3, Species::Oxygen).unwrap();
        for i in 0..50 {
            assert_eq!(disk.z_o[i], before[i]);
        }
    }

    #[test]
    fn metal_mass_is_conserved_over_many_steps() {
        let g = geom(50);
        let mut disk = gradient_disk(50, 1.0e-3);
        let m0 = metal_mass(&disk, &g);
        for _ in 0..10_000 {
            diffuse_metals(&mut disk, &g, 1.0e-4, Species::Oxygen).unwrap();
        }
        let m1 = metal_mass(&disk, &g);
        assert!(
            ((m1 - m0) / m0).abs() < 1.0e-8,
            "metal mass drifted: {} -> {}",
            m0,
            m1
        );
    }

    #[test]
    fn diffusion_flattens_the_gradient() {
        let g = geom(50);
        let mut disk = gradient_disk(50, 1.0e-3);
        let spread0 = disk.z_o[49] - disk.z_o[0];
        for _ in 0..200 {
            diffuse_metals(&mut disk, &g, 1.0e-2, Species::Oxygen).unwrap();
        }
        let spread1 = disk.z_o[49] - disk.z_o[0];
        assert!(spread1 > 0.0);
        assert!(spread1 < spread0, "gradient should relax: {} -> {}", spread0, spread1);
    }

    #[test]
    fn iron_is_untouched_by_an_oxygen_step() {
        let g = geom(50);
        let mut disk = gradient_disk(50, 1.0e-3);
        diffuse_metals(&mut disk, &g, 1.0e-3, Species::Oxygen).unwrap();
        for i in 0..50 {
            assert_eq!(disk.z_fe[i], 5.0e-4);
        }
    }
}
