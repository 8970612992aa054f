use clap::Parser;
use papyrus_search::Opts;
use papyrus_search::cli::SubCommandExtend;
use papyrus_search::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Add(config) => config.run(&opts).await,
        SubCommand::Search(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
        SubCommand::Worker(config) => config.run(&opts).await,
        SubCommand::Status(config) => config.run(&opts).await,
    }
}
