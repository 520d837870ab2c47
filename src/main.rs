// Entrypoint for the release CLI.
// - Keeps `main` small: parse, set up logging, run the chosen task.
// - Returns `anyhow::Result` so any failure exits nonzero with its cause.

use bootstrap_release::{cli, logging};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    // Accept `gh_upload:True` as well as `gh_upload --tag`.
    let args = cli::expand_task_args(std::env::args_os());
    let cli = cli::Cli::parse_from(args);

    logging::init(&cli.log_level);
    cli::run(cli)
}
