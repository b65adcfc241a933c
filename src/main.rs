use clap::Parser; // for cli

use ipgate::config::Args;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // parse cli arguments
    let args = Args::parse();
    ipgate::run(args).await
}
