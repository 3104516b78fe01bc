mod app;
mod catalog;
mod category;
mod cli;
mod config;
mod engine;
mod error;
mod fingerprint;
mod inspect;
mod library;
mod logging;
mod scanner;
mod session;

use anyhow::Result;

fn main() -> Result<()> {
    let data_dir = config::base_data_dir()?;
    let _guard = logging::init(&data_dir)?;
    cli::run()
}
