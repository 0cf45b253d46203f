pub static DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
pub static VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));


use std::ffi::OsStr;
use std::fs::read_to_string;
use std::path::Path;
use serde::{Serialize, Deserialize};

use crate::cosmology::{AnyAccretionHistory, Cosmology};
use crate::dimensions::{Scales, Z_SOL_FE, Z_SOL_O};
use crate::mesh::Mesh;
use crate::models::{ExponentialDisk, InitialModel, Resume, UniformRatio};
use crate::state::{Disk, DiskParams};
use crate::stepper::{RunOptions, Setup};




// ============================================================================
#[derive(thiserror::Error, Debug)]
pub enum Error {

    #[error("{0}")]
    IO(#[from] std::io::Error),

    #[error("{0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("unknown input file type '{0}'")]
    UnknownInputType(String),
}




/**
 * Model choice
 */
#[derive(Clone, Serialize, Deserialize, derive_more::From)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub enum AnyModel {
    UniformRatio(UniformRatio),
    ExponentialDisk(ExponentialDisk),
    Resume(Resume),
}




/**
 * Physical parameters as the user writes them; every field has the
 * fiducial default, so presets only name what they change. Resolved into
 * the dimensionless DiskParams once the unit scales are known.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Physics {

    /// Q_* relaxation timescale [local orbital times]
    pub tau_heat: f64,

    /// Turbulent dissipation rate parameter
    pub eta: f64,

    /// Star formation efficiency per free-fall time
    pub eps_ff: f64,

    /// Gas temperature setting the thermal dispersion floor [K]
    pub gas_temp_k: f64,

    /// Q_* below which transient spirals heat the stars
    pub q_lim: f64,

    /// The Q the torque holds the disk at
    pub fixed_q: f64,

    /// Fractional change per time step
    pub tol: f64,

    /// Thickness correction to the gas Q
    pub thickness: f64,

    /// Use the analytic (Romeo-Wiegert) Q instead of the numerical
    /// (Rafikov) one
    pub analytic_q: bool,

    /// MRI viscosity floor
    pub alpha_mri: f64,

    /// Cells over which the GI-to-MRI handoff decays
    pub ndecay: f64,

    /// Metal diffusion coefficient
    pub kappa_metals: f64,

    /// Floor on the stellar velocity dispersions [km/s]
    pub min_sig_st_kms: f64,

    /// Advect the passive populations
    pub migrate_passive: bool,

    pub n_active: usize,
    pub n_passive: usize,

    /// Mass loading factor and its scalings with column density, gas
    /// fraction, and halo mass
    pub mass_loading_factor: f64,
    pub mlf_col_scaling: f64,
    pub mlf_fg_scaling: f64,
    pub mlf_mh_scaling: f64,

    /// Instantaneous and asymptotic remnant fractions and the enrichment
    /// mixing fraction
    pub rf_inst: f64,
    pub rf_asym: f64,
    pub zeta: f64,

    /// Yields per species
    pub y_o: f64,
    pub y_fe: f64,

    /// IGM metallicities (absolute mass fractions)
    pub z_igm_o: f64,
    pub z_igm_fe: f64,

    /// Torque at the inner boundary
    pub ibc_tau: f64,

    /// Fraction of the circular speed carried in by accreting gas
    pub accretion_heating: f64,

    /// Cloud-star scattering rate
    pub cloud_heating: f64,
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            tau_heat: 2.0,
            eta: 1.5,
            eps_ff: 0.01,
            gas_temp_k: 7000.0,
            q_lim: 2.5,
            fixed_q: 2.0,
            tol: 1.0e-4,
            thickness: 1.5,
            analytic_q: true,
            alpha_mri: 0.0,
            ndecay: 6.0,
            kappa_metals: 1.0e-3,
            min_sig_st_kms: 1.0,
            migrate_passive: true,
            n_active: 1,
            n_passive: 10,
            mass_loading_factor: 1.0,
            mlf_col_scaling: 0.0,
            mlf_fg_scaling: 0.0,
            mlf_mh_scaling: -1.0 / 3.0,
            rf_inst: 0.46,
            rf_asym: 0.46,
            zeta: 1.0,
            y_o: 0.054,
            y_fe: 0.0017,
            z_igm_o: 0.1 * Z_SOL_O,
            z_igm_fe: 0.1 * Z_SOL_FE,
            ibc_tau: 0.0,
            accretion_heating: 0.0,
            cloud_heating: 0.0,
        }
    }
}




/**
 * Simulation control: how long to run, how frequently to perform side
 * effects, and whether to relax the gas first
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Control {

    /// Output files are named <run_name>_radial.dat and so on
    pub run_name: String,

    /// The simulation end time [outer rotation times]
    pub final_time: f64,

    /// The maximum number of steps
    #[serde(default = "Control::default_step_max")]
    pub step_max: usize,

    /// The simulation time between radial/evolution records
    #[serde(default = "Control::default_radial_interval")]
    pub radial_interval: f64,

    /// The simulation time between stellar population records
    #[serde(default = "Control::default_stars_interval")]
    pub stars_interval: f64,

    /// The simulation time between console messages
    #[serde(default = "Control::default_message_interval")]
    pub message_interval: f64,

    /// Relax the gas with star formation off before the production run
    #[serde(default = "Control::default_warmup")]
    pub warmup: bool,

    /// Warm-up run length [outer rotation times]
    #[serde(default = "Control::default_warmup_time")]
    pub warmup_time: f64,

    /// Consecutive capped steps that declare the warm-up converged
    #[serde(default = "Control::default_convergence_steps")]
    pub convergence_steps: usize,
}

impl Control {
    fn default_step_max() -> usize {
        10_000_000
    }
    fn default_radial_interval() -> f64 {
        1.0
    }
    fn default_stars_interval() -> f64 {
        5.0
    }
    fn default_message_interval() -> f64 {
        0.1
    }
    fn default_warmup() -> bool {
        true
    }
    fn default_warmup_time() -> f64 {
        300.0
    }
    fn default_convergence_steps() -> usize {
        10
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.run_name.is_empty() {
            anyhow::bail!("run_name must not be empty")
        }
        if self.final_time <= 0.0 {
            anyhow::bail!("final_time must be positive")
        }
        if self.radial_interval <= 0.0 || self.stars_interval <= 0.0 || self.message_interval <= 0.0
        {
            anyhow::bail!("output intervals must be positive")
        }
        Ok(())
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            final_time: self.final_time,
            step_max: self.step_max,
            radial_interval: self.radial_interval,
            stars_interval: self.stars_interval,
            message_interval: self.message_interval,
            convergence_steps: 0,
        }
    }

    pub fn warmup_options(&self) -> RunOptions {
        RunOptions {
            final_time: self.warmup_time,
            step_max: self.step_max,
            radial_interval: self.warmup_time,
            stars_interval: self.warmup_time,
            message_interval: self.warmup_time / 10.0,
            convergence_steps: self.convergence_steps.max(1),
        }
    }
}




/**
 * User configuration
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    #[serde(default)]
    pub physics: Physics,
    pub scales: Scales,
    pub cosmology: Cosmology,
    pub accretion: AnyAccretionHistory,
    pub mesh: Mesh,
    pub model: AnyModel,
    pub control: Control,
}




/**
 * App state
 */
#[derive(Clone, Serialize, Deserialize)]
pub struct App {
    pub config: Configuration,
    pub version: String,
}




// ============================================================================
impl Physics {

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.eta <= 0.0 {
            anyhow::bail!("eta must be positive")
        }
        if self.eps_ff < 0.0 || self.eps_ff >= 1.0 {
            anyhow::bail!("eps_ff must lie in [0, 1)")
        }
        if self.tau_heat <= 0.0 {
            anyhow::bail!("tau_heat must be positive")
        }
        if self.fixed_q < 1.0 {
            anyhow::bail!("fixed_q below 1 leaves the disk unstable by construction")
        }
        if self.q_lim < self.fixed_q {
            anyhow::bail!("q_lim must be at least fixed_q")
        }
        if self.tol <= 0.0 || self.tol > 0.1 {
            anyhow::bail!("tol must lie in (0, 0.1]")
        }
        if self.thickness < 1.0 {
            anyhow::bail!("thickness must be at least 1")
        }
        if self.n_active == 0 || self.n_passive == 0 {
            anyhow::bail!("n_active and n_passive must be at least 1")
        }
        if !(self.rf_inst > 0.0 && self.rf_inst <= 1.0) || !(self.rf_asym > 0.0 && self.rf_asym <= 1.0)
        {
            anyhow::bail!("remnant fractions must lie in (0, 1]")
        }
        if self.kappa_metals < 0.0 {
            anyhow::bail!("kappa_metals must be non-negative")
        }
        if self.min_sig_st_kms <= 0.0 {
            anyhow::bail!("min_sig_st_kms must be positive")
        }
        if !(self.z_igm_o > 0.0 && self.z_igm_o < 1.0) || !(self.z_igm_fe > 0.0 && self.z_igm_fe < 1.0)
        {
            anyhow::bail!("IGM metallicities must lie in (0, 1)")
        }
        Ok(())
    }

    pub fn resolve(
        &self,
        dims: &crate::dimensions::Dimensions,
        mh0: f64,
        run_span: f64,
    ) -> DiskParams {
        let recycle_rate = if self.rf_inst > self.rf_asym && run_span > 0.0 {
            (self.rf_inst - self.rf_asym) / (self.rf_inst * run_span)
        } else {
            0.0
        };
        DiskParams {
            tau_heat: self.tau_heat,
            eta: self.eta,
            sig_th: dims.sig_th(self.gas_temp_k),
            eps_ff: self.eps_ff,
            q_lim: self.q_lim,
            fixed_q: self.fixed_q,
            tol: self.tol,
            thickness: self.thickness,
            mass_loading_factor: self.mass_loading_factor,
            mlf_col_scaling: self.mlf_col_scaling,
            mlf_fg_scaling: self.mlf_fg_scaling,
            mlf_mh_scaling: self.mlf_mh_scaling,
            kappa_metals: self.kappa_metals,
            min_sig_st: self.min_sig_st_kms * 1.0e5 / dims.vphi_r,
            rf_inst: self.rf_inst,
            rf_asym: self.rf_asym,
            zeta: self.zeta,
            recycle_rate,
            y_o: self.y_o,
            y_fe: self.y_fe,
            z_igm_o: self.z_igm_o,
            z_igm_fe: self.z_igm_fe,
            mh0,
            analytic_q: self.analytic_q,
            migrate_passive: self.migrate_passive,
            n_active: self.n_active,
            n_passive: self.n_passive,
            alpha_mri: self.alpha_mri,
            ndecay: self.ndecay,
            ibc_tau: self.ibc_tau,
            accretion_heating: self.accretion_heating,
            cloud_heating: self.cloud_heating,
        }
    }
}




// ============================================================================
impl InitialModel for AnyModel {

    fn validate(&self) -> anyhow::Result<()> {
        match self {
            AnyModel::UniformRatio(m) => m.validate(),
            AnyModel::ExponentialDisk(m) => m.validate(),
            AnyModel::Resume(m) => m.validate(),
        }
    }

    fn build(&self, params: DiskParams, setup: &Setup) -> anyhow::Result<Disk> {
        match self {
            AnyModel::UniformRatio(m) => m.build(params, setup),
            AnyModel::ExponentialDisk(m) => m.build(params, setup),
            AnyModel::Resume(m) => m.build(params, setup),
        }
    }
}

impl AnyModel {

    /**
     * Whether the production disk rebuilt from a warm-up hand-off should
     * covary the gas and stellar dispersions in EnforceFixedQ. An
     * exponential stellar disk prescribes sigma_* outright, so only the
     * gas may move.
     */
    pub fn resume_fixed_phi0(&self) -> bool {
        match self {
            AnyModel::UniformRatio(_) => true,
            AnyModel::ExponentialDisk(_) => false,
            AnyModel::Resume(m) => m.fixed_phi0,
        }
    }
}




// ============================================================================
impl Configuration {

    pub fn validate(&self) -> anyhow::Result<()> {
        self.physics.validate()?;
        self.scales.validate()?;
        self.cosmology.validate()?;
        self.accretion.validate()?;
        self.mesh.validate()?;
        self.model.validate()?;
        self.control.validate()?;
        Ok(())
    }

    /**
     * Resolve the configuration into the immutable run setup and the
     * dimensionless physical parameters.
     */
    pub fn setup(&self) -> anyhow::Result<(Setup, DiskParams)> {
        let cosmic = self.cosmology.tabulate();
        let accretion = self.accretion.tabulate(&cosmic);
        let mh0 = self.accretion.mh0();
        let mdot0 = accretion.mdot_ext0_cgs();
        if mdot0 <= 0.0 {
            anyhow::bail!("the accretion history supplies no gas at z_start")
        }
        let dims = self.scales.resolve(mh0, mdot0);
        let run_span = cosmic.lbt_start() / dims.time_sec();
        let params = self.physics.resolve(&dims, mh0, run_span);
        let geom = self.mesh.geometry();
        Ok((Setup { geom, dims, cosmic, accretion }, params))
    }
}




// ============================================================================
impl App {

    /**
     * Return self as a result, which will be in an error state if any of
     * the configuration items did not pass validation.
     */
    pub fn validate(self) -> anyhow::Result<Self> {
        self.config.validate()?;
        Ok(self)
    }

    pub fn from_config(config: Configuration) -> Self {
        Self { config, version: VERSION.to_string() }
    }

    /**
     * Construct a new App instance from a config file.
     */
    pub fn from_file(filename: &str) -> Result<Self, Error> {
        match Path::new(&filename).extension().and_then(OsStr::to_str) {
            Some("yaml") => {
                Ok(Self::from_config(serde_yaml::from_str(&read_to_string(filename)?)?))
            }
            _ => Err(Error::UnknownInputType(filename.to_string())),
        }
    }

    /**
     * Construct a new App instance from a preset (hard-coded) configuration
     * name, or otherwise an input file if no matching preset is found.
     */
    pub fn from_preset_or_file(input: &str) -> Result<Self, Error> {
        for (key, yaml) in Self::presets() {
            if input == key {
                return Ok(Self::from_config(serde_yaml::from_str(yaml)?));
            }
        }
        Self::from_file(input)
    }

    pub fn presets() -> Vec<(&'static str, &'static str)> {
        vec![
            ("uniform_ratio", include_str!("setups/uniform_ratio.yaml")),
            ("exponential", include_str!("setups/exponential.yaml")),
        ]
    }
}




// ============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_parses_and_validates() {
        for (name, yaml) in App::presets() {
            let app: App = App::from_config(serde_yaml::from_str(yaml).unwrap());
            app.validate().unwrap_or_else(|e| panic!("preset {} invalid: {}", name, e));
        }
    }

    #[test]
    fn presets_resolve_into_a_runnable_setup() {
        let (_, yaml) = App::presets()[0];
        let app = App::from_config(serde_yaml::from_str(yaml).unwrap());
        let (setup, params) = app.config.setup().unwrap();
        assert!(setup.dims.chi() > 0.0);
        assert!(params.sig_th > 0.0 && params.sig_th < 1.0);
        assert!(params.min_sig_st > 0.0 && params.min_sig_st < params.sig_th);
        assert_eq!(setup.geom.nx, app.config.mesh.num_cells);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let yaml = "not_a_real_knob: 1.0\n";
        assert!(serde_yaml::from_str::<Physics>(yaml).is_err());
    }

    #[test]
    fn non_yaml_inputs_are_rejected() {
        assert!(matches!(App::from_file("chkpt.0000.cbor"), Err(Error::UnknownInputType(_))));
    }
}
