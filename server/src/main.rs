use clap::Parser;
use deskpilot_server::{AppState, args::Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let state = AppState::from_args(&args)?;

    deskpilot_server::run(state, args.bind).await
}
