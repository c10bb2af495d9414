mod command;
mod config;
mod logger;
mod progress;
mod util;

fn main() -> anyhow::Result<()> {
    command::run()
}
