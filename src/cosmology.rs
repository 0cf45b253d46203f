use serde::{Serialize, Deserialize};
use crate::dimensions::{MSOL, SPERYEAR};
use crate::lookup_table::LookupTable;


/**
 * Flat LCDM background. Only the redshift-time mapping is needed: the
 * stellar age bins and the accretion history are both keyed on lookback
 * time in seconds.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cosmology {

    /// Matter density parameter
    pub omega_m: f64,

    /// Dark-energy density parameter
    pub omega_l: f64,

    /// Hubble constant [1/s]
    pub hubble: f64,

    /// Redshift at which the simulation starts
    pub z_start: f64,
}


/**
 * Tabulated redshift-time mapping, built once per run.
 */
#[derive(Clone)]
pub struct CosmicTime {
    lbt_of_z: LookupTable,
    z_of_lbt: LookupTable,
    z_start: f64,
}


// ============================================================================
impl Cosmology {

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.omega_m <= 0.0 || self.omega_l < 0.0 {
            anyhow::bail!("density parameters must satisfy omega_m > 0, omega_l >= 0")
        }
        if self.hubble <= 0.0 {
            anyhow::bail!("hubble must be positive (units of 1/s)")
        }
        if self.z_start <= 0.0 {
            anyhow::bail!("z_start must be positive")
        }
        Ok(())
    }

    /**
     * Tabulate lookback time against redshift out past the starting
     * redshift, by trapezoid integration of dt = dz / ((1+z) H(z)).
     */
    pub fn tabulate(&self) -> CosmicTime {
        const NTAB: usize = 2048;
        let z_max = self.z_start + 2.0;
        let dz = z_max / NTAB as f64;

        let mut forward = Vec::with_capacity(NTAB + 1);
        let mut lbt = 0.0;
        let mut prev = 1.0 / self.hz(0.0);
        forward.push((0.0, 0.0));
        for i in 1..=NTAB {
            let z = dz * i as f64;
            let integrand = 1.0 / ((1.0 + z) * self.hz(z));
            lbt += 0.5 * (integrand + prev) * dz;
            prev = integrand;
            forward.push((z, lbt));
        }

        let inverse = forward.iter().map(|&(z, t)| (t, z)).collect();
        CosmicTime {
            lbt_of_z: LookupTable::new(forward),
            z_of_lbt: LookupTable::new(inverse),
            z_start: self.z_start,
        }
    }

    fn hz(&self, z: f64) -> f64 {
        let zp1 = 1.0 + z;
        self.hubble * (self.omega_m * zp1 * zp1 * zp1 + self.omega_l).sqrt()
    }
}


// ============================================================================
impl CosmicTime {

    pub fn z_start(&self) -> f64 {
        self.z_start
    }

    /// Lookback time in seconds at redshift z
    pub fn lbt(&self, z: f64) -> f64 {
        self.lbt_of_z.sample_clamped(z)
    }

    /// Lookback time at the starting redshift
    pub fn lbt_start(&self) -> f64 {
        self.lbt(self.z_start)
    }

    /// Redshift at a given lookback time in seconds (clamped at z = 0)
    pub fn z_at_lbt(&self, lbt: f64) -> f64 {
        self.z_of_lbt.sample_clamped(lbt)
    }
}


/**
 * External accretion history choices. Each is tabulated at construction
 * into halo mass and gas accretion rate against redshift.
 */
#[derive(Clone, Serialize, Deserialize, derive_more::From)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub enum AnyAccretionHistory {
    Constant(ConstantAccretion),
    Bouche09(Bouche09),
}


/**
 * Fixed gas accretion rate at all redshifts; the halo neither grows nor
 * quenches. The simplest history, used by the regression setups.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstantAccretion {

    /// Gas accretion rate [Msun/yr]
    pub mdot_msun_yr: f64,

    /// Halo mass [Msun]
    pub mh0: f64,
}


/**
 * Bouche et al. (2009)-style history: the halo grows along the mean
 * accretion track and the gas supply follows the halo, shut off above a
 * quenching mass.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Bouche09 {

    /// Halo mass at z = 0 [Msun]
    pub mh0: f64,

    /// Efficiency of gas accretion below the quenching mass
    #[serde(default = "Bouche09::default_epsilon")]
    pub epsilon_in: f64,

    /// Halo mass above which gas accretion shuts off [Msun]
    #[serde(default = "Bouche09::default_m_quench")]
    pub m_quench: f64,
}


/**
 * Tabulated accretion history: halo mass [Msun] and gas accretion rate
 * [Msun/yr] against redshift, valid over [0, z_start].
 */
#[derive(Clone)]
pub struct AccretionTables {
    mh_of_z: LookupTable,
    mdot_of_z: LookupTable,
    mdot_at_start: f64,
}


// ============================================================================
impl Bouche09 {
    fn default_epsilon() -> f64 {
        0.7
    }
    fn default_m_quench() -> f64 {
        1.5e12
    }

    fn dmh_dt(mh: f64, z: f64) -> f64 {
        // mean dark-matter accretion rate [Msun/yr]
        34.0 * (mh / 1.0e12).powf(1.14) * ((1.0 + z) / 3.2).powf(2.4)
    }

    fn mdot_gas(&self, mh: f64, z: f64) -> f64 {
        if mh > self.m_quench {
            return 0.0;
        }
        7.0 * self.epsilon_in * (mh / 1.0e12).powf(1.1) * ((1.0 + z) / 3.2).powf(2.2)
    }
}


// ============================================================================
impl AnyAccretionHistory {

    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            AnyAccretionHistory::Constant(h) => {
                if h.mdot_msun_yr <= 0.0 || h.mh0 <= 0.0 {
                    anyhow::bail!("constant accretion history needs mdot_msun_yr > 0 and mh0 > 0")
                }
                Ok(())
            }
            AnyAccretionHistory::Bouche09(h) => {
                if h.mh0 <= 0.0 || h.epsilon_in < 0.0 || h.m_quench <= 0.0 {
                    anyhow::bail!("bouche09 history needs mh0 > 0, epsilon_in >= 0, m_quench > 0")
                }
                Ok(())
            }
        }
    }

    pub fn mh0(&self) -> f64 {
        match self {
            AnyAccretionHistory::Constant(h) => h.mh0,
            AnyAccretionHistory::Bouche09(h) => h.mh0,
        }
    }

    /**
     * Tabulate the history over [0, z_start]. The Bouche09 track is
     * integrated backward from its z = 0 halo mass along the cosmic time
     * table; the constant history is flat by construction.
     */
    pub fn tabulate(&self, cosmic: &CosmicTime) -> AccretionTables {
        const NTAB: usize = 512;
        let z_start = cosmic.z_start();
        let dz = z_start / NTAB as f64;

        let (mh_rows, mdot_rows) = match self {
            AnyAccretionHistory::Constant(h) => {
                let mh: Vec<_> = (0..=NTAB).map(|i| (dz * i as f64, h.mh0)).collect();
                let md: Vec<_> = (0..=NTAB).map(|i| (dz * i as f64, h.mdot_msun_yr)).collect();
                (mh, md)
            }
            AnyAccretionHistory::Bouche09(h) => {
                // march from z = 0 upward, shrinking the halo along the track
                let mut mh = h.mh0;
                let mut mh_rows = vec![(0.0, mh)];
                let mut md_rows = vec![(0.0, h.mdot_gas(mh, 0.0))];
                for i in 1..=NTAB {
                    let z0 = dz * (i - 1) as f64;
                    let z1 = dz * i as f64;
                    let dt_yr = (cosmic.lbt(z1) - cosmic.lbt(z0)) / SPERYEAR;
                    mh -= Self::dmh_dt_avg(mh, z0, z1) * dt_yr;
                    mh = mh.max(1.0e6);
                    mh_rows.push((z1, mh));
                    md_rows.push((z1, h.mdot_gas(mh, z1)));
                }
                (mh_rows, md_rows)
            }
        };

        let mdot_of_z = LookupTable::new(mdot_rows);
        let mdot_at_start = mdot_of_z.sample_clamped(z_start);
        AccretionTables {
            mh_of_z: LookupTable::new(mh_rows),
            mdot_of_z,
            mdot_at_start,
        }
    }

    fn dmh_dt_avg(mh: f64, z0: f64, z1: f64) -> f64 {
        0.5 * (Bouche09::dmh_dt(mh, z0) + Bouche09::dmh_dt(mh, z1))
    }
}


// ============================================================================
impl AccretionTables {

    /// Halo mass [Msun] at redshift z
    pub fn mh_of_z(&self, z: f64) -> f64 {
        self.mh_of_z.sample_clamped(z)
    }

    /// Gas accretion rate [Msun/yr] at redshift z
    pub fn mdot_msun_yr(&self, z: f64) -> f64 {
        self.mdot_of_z.sample_clamped(z)
    }

    /// Gas accretion rate [g/s] at the starting redshift; sets MdotExt0
    pub fn mdot_ext0_cgs(&self) -> f64 {
        self.mdot_at_start * MSOL / SPERYEAR
    }

    /// Accretion rate relative to its value at the starting redshift
    pub fn mdot_ratio(&self, z: f64) -> f64 {
        if self.mdot_at_start <= 0.0 {
            return 0.0;
        }
        self.mdot_msun_yr(z) / self.mdot_at_start
    }
}
