use serde::{Serialize, Deserialize};


pub static MSOL: f64 = 1.98892e33;          // g
pub static SPERYEAR: f64 = 3.15569e7;       // s
pub static CM_PER_KPC: f64 = 3.08568025e21; // cm
pub static GRAVITY: f64 = 6.67384e-8;       // cm^3 g^-1 s^-2
pub static KBOLTZ: f64 = 1.3806503e-16;     // erg K^-1
pub static MHYDROGEN: f64 = 1.67262158e-24; // g
pub static Z_SOL: f64 = 0.02;
pub static Z_SOL_O: f64 = 5.7e-3;
pub static Z_SOL_FE: f64 = 1.3e-3;
pub static Z_BBN: f64 = 1.0e-8;


/**
 * Dimensional scales of a run. The disk state is dimensionless: radii in
 * units of the outer radius, velocities in units of the circular velocity
 * there, mass fluxes in units of the initial external accretion rate. These
 * three constants carry every conversion back to cgs.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scales {

    /// Outer radius of the disk [kpc]
    pub radius_kpc: f64,

    /// Circular velocity of a 10^12 Msun halo [km/s]; the run's velocity
    /// scale follows (Mh0/10^12)^(1/3)
    pub vphi_per_mh12_kms: f64,
}


/**
 * Resolved cgs scales, built once per run.
 */
#[derive(Clone)]
pub struct Dimensions {
    pub radius: f64,    // cm
    pub vphi_r: f64,    // cm/s
    pub mdot_ext0: f64, // g/s
}


// ============================================================================
impl Scales {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.radius_kpc <= 0.0 {
            anyhow::bail!("radius_kpc must be positive")
        }
        if self.vphi_per_mh12_kms <= 0.0 {
            anyhow::bail!("vphi_per_mh12_kms must be positive")
        }
        Ok(())
    }

    pub fn resolve(&self, mh0_msun: f64, mdot_ext0_cgs: f64) -> Dimensions {
        Dimensions {
            radius: self.radius_kpc * CM_PER_KPC,
            vphi_r: self.vphi_per_mh12_kms * 1.0e5 * (mh0_msun / 1.0e12).powf(1.0 / 3.0),
            mdot_ext0: mdot_ext0_cgs,
        }
    }
}


// ============================================================================
impl Dimensions {

    /// Dimensionless self-gravity strength G Mdot / vphi^3
    pub fn chi(&self) -> f64 {
        GRAVITY * self.mdot_ext0 / (self.vphi_r * self.vphi_r * self.vphi_r)
    }

    /// Column density in g/cm^2 from its dimensionless value
    pub fn col_cgs(&self, col: f64) -> f64 {
        col * self.mdot_ext0 / (self.vphi_r * self.radius)
    }

    /// Seconds per unit of dimensionless time
    pub fn time_sec(&self) -> f64 {
        self.radius / self.vphi_r
    }

    /// Solar masses per unit of dimensionless mass (col x^2 dlnx sums)
    pub fn mass_msun(&self, m: f64) -> f64 {
        m * 2.0 * std::f64::consts::PI * self.radius * self.mdot_ext0 / (self.vphi_r * MSOL)
    }

    /// Dimensionless accretion rate from a cgs mass flux
    pub fn mdot_hat(&self, mdot_cgs: f64) -> f64 {
        mdot_cgs / (2.0 * std::f64::consts::PI * self.mdot_ext0)
    }

    /// Thermal dispersion floor, in units of vphiR, for a gas temperature
    pub fn sig_th(&self, gas_temp_k: f64) -> f64 {
        (gas_temp_k * KBOLTZ / MHYDROGEN).sqrt() / self.vphi_r
    }
}


// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> Dimensions {
        Scales { radius_kpc: 20.0, vphi_per_mh12_kms: 220.0 }
            .resolve(1.0e12, 2.0 * MSOL / SPERYEAR)
    }

    #[test]
    fn accreted_mass_round_trips_through_the_units() {
        // Accreting at the fiducial rate for one time unit must add
        // mdot_ext0 * (radius/vphi) grams.
        let d = dims();
        let a_hat = d.mdot_hat(d.mdot_ext0);
        let accreted = d.mass_msun(a_hat * 1.0);
        let expected = d.mdot_ext0 * d.time_sec() / MSOL;
        assert!((accreted - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn thermal_floor_is_small_against_the_rotation_speed() {
        let d = dims();
        let s = d.sig_th(7000.0);
        assert!(s > 0.0 && s < 0.1);
    }

    #[test]
    fn chi_is_dimensionless_and_small() {
        let d = dims();
        assert!(d.chi() > 0.0 && d.chi() < 1.0);
    }
}
