use crate::reports;
use calsample::calibration::CalibrationSystem;
use calsample::config::RunSettings;
use calsample::context::{CancellationToken, SearchContext};
use calsample::error::CalResult;
use calsample::instance::load_instance;
use calsample::milp::model::ModelLayout;
use calsample::milp::CalibrationSolverFactory;
use calsample::output::{default_output_path, ResultSink};
use calsample::search::SearchController;
use clap::{ArgMatches, Args};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Instance file
    pub instance: PathBuf,

    /// Sample size (overrides the instance file)
    #[arg(short = 'n', long = "sample-size")]
    pub sample_size: Option<usize>,

    #[command(flatten)]
    pub settings: RunSettings,

    /// Print the effective settings as JSON and exit
    #[arg(long, default_value_t = false)]
    pub dump_settings: bool,
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn run(args: &SearchArgs, matches: &ArgMatches, token: CancellationToken) -> CalResult<()> {
    info!("📂 Loading instance: {}", args.instance.display());
    let mut instance = load_instance(&args.instance)?;
    instance.settings.merge_from_cli(&args.settings, matches);
    if let Some(n) = args.sample_size {
        instance.set_sample_size(n)?;
    }
    instance.settings.validate()?;

    if args.dump_settings {
        println!("{}", instance.settings.to_json()?);
        return Ok(());
    }

    if !instance.prepare_run() {
        info!("No replications requested. Exiting.");
        return Ok(());
    }

    let seed = instance.settings.seed.unwrap_or_else(clock_seed);
    instance.settings.seed = Some(seed);
    let output = instance
        .settings
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.instance));

    info!(
        "🚀 N={} n={} p={} | algorithm {} | {} replication(s) | seed {}",
        instance.population,
        instance.sample_size,
        instance.n_calibration,
        instance.settings.algorithm,
        instance.settings.replications,
        seed
    );

    let instance = Arc::new(instance);
    let system = Arc::new(CalibrationSystem::from_instance(&instance)?);
    let factory = CalibrationSolverFactory::new(instance.clone(), system.clone())?;
    let mut controller = SearchController::new(instance.clone(), system, factory, seed)?;
    let mut sink = ResultSink::create(&output, &instance)?;

    let ctx = SearchContext::new(token);
    let epsilon = instance.settings.effective_epsilon();
    let layout = ModelLayout::new(instance.population);

    let results = controller.run(&ctx, |result| {
        if let Some(best) = &result.best {
            let picked: Vec<String> = best
                .selected(&layout)
                .iter()
                .enumerate()
                .filter(|(_, b)| **b)
                .map(|(i, _)| instance.unit_id(i))
                .collect();
            info!("sample: {}", picked.join(" "));
            if best.objective_squared() > epsilon {
                warn!(
                    "⚠️  Solution has large objective at replication {}",
                    result.replication + 1
                );
            }
        }
        sink.write(result, &instance)
    })?;

    reports::print_summary(&instance, &results);

    if let Some(best) = results
        .iter()
        .filter_map(|r| r.best.as_ref())
        .min_by(|a, b| a.objective.total_cmp(&b.objective))
    {
        println!("Objective: {:.6}", best.objective_squared());
    }
    Ok(())
}
