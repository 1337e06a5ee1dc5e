use clap::Parser;
use courier::app::cli::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let status = courier::app::startup::startup(args).await;
    std::process::exit(status);
}
