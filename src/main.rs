mod cli;
mod client;
mod config;
mod error;
mod page;

#[tokio::main]
async fn main() {
    if let Err(err) = cli::run().await {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}
