use clap::Parser;
use stockcast::cli::{Cli, init_tracing, run};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}
