mod exponential;
mod resume;
mod uniform_ratio;

pub use exponential::ExponentialDisk;
pub use resume::{disk_from_initializer, Resume};
pub use uniform_ratio::UniformRatio;

use std::f64::consts::PI;
use crate::state::{Disk, DiskParams};
use crate::stepper::Setup;


/**
 * Implemented by types that can turn a compact set of physical inputs into
 * a fully initialized disk: state variables set, one active and one
 * passive population instantiated, and Q driven to its fixed value.
 */
pub trait InitialModel {
    fn validate(&self) -> anyhow::Result<()>;
    fn build(&self, params: DiskParams, setup: &Setup) -> anyhow::Result<Disk>;
}


/**
 * Shared post-conditions: the bulge seeds from the innermost cell and the
 * initial masses are recorded for the conservation diagnostics.
 */
pub(crate) fn finalize(disk: &mut Disk, setup: &Setup) {
    let geom = &setup.geom;
    disk.m_bulge = PI * geom.x[0] * geom.x[0] * (disk.col[0] + disk.active_col_st(0));
    disk.initial_gas_mass =
        setup.dims.mass_msun(disk.total_weighted_by_area(&disk.col, geom));
    let mut stars = 0.0;
    for sp in &disk.sps_active {
        stars += disk.total_weighted_by_area(&sp.col, geom);
    }
    disk.initial_stellar_mass = setup.dims.mass_msun(stars);
}
