use clap::Parser;
use nesstar_export::cli;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = cli::Cli::parse();
    cli::init_tracing();

    let code = cli::run(args).await;
    // The exit code is the contract with the caller, success included.
    std::process::exit(code);
}
