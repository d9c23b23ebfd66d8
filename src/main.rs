mod app;
mod cli;
mod logging;

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::from_args();
    logging::init_logging(cli.log_format, cli.log_level);

    let config = cli.into_config()?;
    app::run(config).await
}
