use std::path::PathBuf;

use xcsf_core::learner::Learner;

use crate::{config::ConfigArg, progress::ProgressTable, util::write_json};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct RunArg {
    #[clap(flatten)]
    config: ConfigArg,
    /// Write the population of the last experiment as JSON
    #[arg(long)]
    population_output: Option<PathBuf>,
    /// Write the per-window performance summaries as JSON
    #[arg(long)]
    performance_output: Option<PathBuf>,
    /// Do not print the progress table
    #[arg(long, short)]
    quiet: bool,
}

pub(crate) fn run(arg: &RunArg) -> anyhow::Result<()> {
    let RunArg {
        config,
        population_output,
        performance_output,
        quiet,
    } = arg;
    let config = config.load()?;
    let mut function = config.function.build()?;
    let mut learner = Learner::new(config.params)?;
    if !quiet {
        learner.add_observer(Box::new(ProgressTable::default()));
    }

    let summaries = learner.run_experiments(&mut function);
    if let Some(last) = summaries.last() {
        eprintln!();
        eprintln!("Final performance, {last}");
    }

    if let Some(path) = performance_output {
        write_json("performance", &summaries, Some(path.as_path()))?;
    }
    if let Some(path) = population_output {
        write_json(
            "population",
            &learner.population().to_records(),
            Some(path.as_path()),
        )?;
    }
    Ok(())
}
