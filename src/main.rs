use spindle::*;
use app::{App, Configuration};
use models::{disk_from_initializer, InitialModel};
use stepper::Status;




// ============================================================================
/**
 * Relax the gas before the production run: star formation off, spiral
 * heating frozen, passive migration off. The converged state is persisted
 * as an Initializer and the production disk starts from it.
 */
fn warm_up(config: &Configuration, run_base: &str) -> anyhow::Result<state::Disk> {
    let (setup, params) = config.setup()?;

    let mut warm_params = params.clone();
    warm_params.eps_ff = 0.0;
    warm_params.tau_heat = 1.0e30;
    warm_params.migrate_passive = false;

    let warm_disk = config.model.build(warm_params, &setup)?;
    let (warm_disk, status) =
        stepper::run(warm_disk, &setup, &config.control.warmup_options(), &format!("{}_icgen", run_base))?;
    if !status.converged {
        anyhow::bail!(
            "initial condition generator failed to converge after {} steps (t = {})",
            status.step,
            status.time
        );
    }
    println!("\twarm-up converged after {} steps", status.step);

    let init = warm_disk.store();
    let file = std::fs::File::create(format!("{}_initializer.yaml", run_base))?;
    serde_yaml::to_writer(file, &init)?;

    disk_from_initializer(&init, params, &setup, config.model.resume_fixed_phi0())
}


fn run(config: &Configuration, run_base: &str) -> anyhow::Result<Status> {
    let (setup, params) = config.setup()?;

    let disk = if config.control.warmup {
        warm_up(config, run_base)?
    } else {
        config.model.build(params, &setup)?
    };

    let (_, status) = stepper::run(disk, &setup, &config.control.run_options(), run_base)?;
    Ok(status)
}




// ============================================================================
fn main() -> anyhow::Result<()> {

    let input = match std::env::args().nth(1) {
        None => {
            let names: Vec<_> = App::presets().iter().map(|(k, _)| *k).collect();
            anyhow::bail!("no input file given (presets: {})", names.join(", "))
        }
        Some(input) => input,
    };
    let outdir = io::parent_directory(&input);

    println!();
    println!("\t{}", app::DESCRIPTION);
    println!("\t{}", app::VERSION);
    println!();
    println!("\tinput file ........ {}", input);
    println!("\toutput directory .. {}", outdir);

    let App { config, .. } = App::from_preset_or_file(&input)?.validate()?;

    for line in serde_yaml::to_string(&config)?.split('\n').skip(1) {
        println!("\t{}", line);
    }
    println!();

    let run_base = format!("{}/{}", outdir, config.control.run_name);

    match run(&config, &run_base) {
        Ok(status) => {
            println!(
                "\tfinished: {} steps, t = {:.4}, z = {:.4}",
                status.step, status.time, status.z
            );
            Ok(())
        }
        Err(e) => {
            let _ = io::write_stde(&run_base, &format!("{:#}", e));
            Err(e)
        }
    }
}
