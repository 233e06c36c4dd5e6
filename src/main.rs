use clap::Parser;
use log::LevelFilter;

use rtftp::cli::{Cli, Role};
use rtftp::config::FileConfig;
use rtftp::logging::{self, LogFacade, fatal};
use rtftp::{client, server};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let file = match cli.config.as_deref().map(FileConfig::load).transpose() {
        Ok(file) => file.unwrap_or_default(),
        Err(e) => {
            logging::init(LevelFilter::Info);
            fatal(&LogFacade, format_args!("{:#}", e));
        }
    };
    logging::init(cli.log_level(&file));

    let outcome = match cli.role(&file) {
        Ok(Role::Server(config)) => server::run(config).await,
        Ok(Role::Client(config, direction)) => client::run(config, direction).await,
        Err(e) => Err(e),
    };

    if let Err(e) = outcome {
        fatal(&LogFacade, format_args!("{:#}", e));
    }
}
