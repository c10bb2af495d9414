use std::path::PathBuf;

use crate::{config::ConfigArg, util::write_json};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct PrintConfigArg {
    #[clap(flatten)]
    config: ConfigArg,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &PrintConfigArg) -> anyhow::Result<()> {
    let config = arg.config.load()?;
    config.function.build()?;
    write_json("configuration", &config, arg.output.as_deref())
}
