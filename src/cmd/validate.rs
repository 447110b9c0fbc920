use crate::reports;
use calsample::calibration::CalibrationSystem;
use calsample::error::CalResult;
use calsample::instance::load_instance;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Instance file
    pub instance: PathBuf,
}

pub fn run(args: &ValidateArgs) -> CalResult<()> {
    info!("📂 Loading instance: {}", args.instance.display());
    let instance = load_instance(&args.instance)?;
    let system = CalibrationSystem::from_instance(&instance)?;

    println!("\n🔎 === INSTANCE AUDIT: {} === 🔎", instance.name);
    reports::print_instance_report(&instance, &system);
    Ok(())
}
