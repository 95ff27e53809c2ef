use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    walksafe_lib::run(walksafe_lib::Cli::parse()).await
}
