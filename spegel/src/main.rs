mod args;
mod config_file;
mod logging;
mod supervisor;

use clap::Parser;
use log::error;

use args::Args;
use supervisor::Supervisor;

#[tokio::main]
async fn main() {
    logging::init();

    let args = Args::parse();
    let args = match args.config_file.clone() {
        Some(path) => match config_file::load(&path) {
            Ok(file) => match args.merge_file_config(file) {
                Ok(merged) => merged,
                Err(e) => {
                    error!("config file {}: {e}", path.display());
                    std::process::exit(1);
                }
            },
            Err(e) => {
                error!("config file {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => args,
    };

    let supervisor = match Supervisor::build(&args).await {
        Ok(s) => s,
        Err(e) => {
            error!("failed to start: {e}");
            std::process::exit(1);
        }
    };

    supervisor
        .run(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
}
