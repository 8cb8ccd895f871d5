use clap::Parser;
use clipmesh_client::{ClientArgs, ClientConfig, init_logging, run};
use tracing::error;

#[tokio::main]
async fn main() {
    let config = ClientConfig::from(ClientArgs::parse());
    init_logging(config.verbose, config.json);

    if let Err(err) = run(config).await {
        error!("{}", err);
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
