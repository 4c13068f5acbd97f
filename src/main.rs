use clap::Parser;
use mediasearch::Opts;
use mediasearch::cli::SubCommandExtend;
use mediasearch::config::SubCommand;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::Scan(config) => config.run(&opts).await,
        SubCommand::SearchText(config) => config.run(&opts).await,
        SubCommand::SearchImage(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
    }
}
