use serde::{Serialize, Deserialize};
use crate::dimensions::{Z_SOL_FE, Z_SOL_O};
use crate::models::{finalize, InitialModel};
use crate::stability::enforce_fixed_q;
use crate::stars::{old_ith_bin, young_ith_bin, StellarPop};
use crate::state::{Disk, DiskParams, Initializer};
use crate::stepper::Setup;


/**
 * Start from a persisted Initializer, the hand-off from a warm-up run to
 * the production run.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Resume {

    /// Path to the persisted initializer (YAML)
    pub path: String,

    /// Rescale the gas and stellar dispersions jointly in EnforceFixedQ
    #[serde(default)]
    pub fixed_phi0: bool,
}


// ============================================================================
impl InitialModel for Resume {

    fn validate(&self) -> anyhow::Result<()> {
        if self.path.is_empty() {
            anyhow::bail!("resume needs a path to a persisted initializer")
        }
        Ok(())
    }

    fn build(&self, params: DiskParams, setup: &Setup) -> anyhow::Result<Disk> {
        let file = std::fs::File::open(&self.path)
            .map_err(|e| anyhow::anyhow!("cannot open initializer {}: {}", self.path, e))?;
        let init: Initializer = serde_yaml::from_reader(file)
            .map_err(|e| anyhow::anyhow!("cannot parse initializer {}: {}", self.path, e))?;
        disk_from_initializer(&init, params, setup, self.fixed_phi0)
    }
}


/**
 * Build a disk from an Initializer: the recorded gas and stellar profiles,
 * fresh age bins, tenth-solar metals, and Q driven back to its fixed
 * value. Shared between the resume model and the in-process warm-up
 * hand-off.
 */
pub fn disk_from_initializer(
    init: &Initializer,
    params: DiskParams,
    setup: &Setup,
    fixed_phi0: bool,
) -> anyhow::Result<Disk> {
    let geom = &setup.geom;
    let nx = geom.nx;
    if init.col.len() != nx || init.sig.len() != nx || init.col_st.len() != nx
        || init.sig_st.len() != nx
    {
        anyhow::bail!(
            "initializer has {} cells but the mesh has {}",
            init.col.len(),
            nx
        );
    }

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
        disk.col[i] = init.col[i];
        disk.sig[i] = init.sig[i];
        disk.z_o[i] = z_o;
        disk.z_fe[i] = z_fe;
        active.col[i] = init.col_st[i];
        active.sig_r[i] = init.sig_st[i].max(p.min_sig_st);
        active.sig_z[i] = active.sig_r[i];
        active.z_o[i] = z_o;
        active.z_fe[i] = z_fe;
    }

    let mut passive = active.clone();
    passive.youngest = young_ith_bin(0, lbt_start, p.n_passive);
    passive.oldest = old_ith_bin(0, lbt_start, p.n_passive);
    disk.sps_active.push(active);
    disk.sps_passive.push(passive);

    enforce_fixed_q(&mut disk, geom, setup.dims.chi(), fixed_phi0)?;
    disk.check_state_vars("Initialize")?;

    finalize(&mut disk, setup);
    Ok(disk)
}
