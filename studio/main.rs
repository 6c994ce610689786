/// ferrite-viz
///
/// Live visual trainer backend: trains small image classifiers on a
/// background thread and streams metrics to the browser over Server-Sent
/// Events. Served by a synchronous tiny_http server.
///
/// Run with:
///   cargo run --release -- --data-dir ./data
/// Then point the frontend at http://127.0.0.1:5000

mod state;
mod routes;
mod handlers;
mod util;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tiny_http::Server;

use ferrite_viz::train::{Device, SessionSettings};

use state::AppState;

#[derive(Debug, Parser)]
#[command(name = "ferrite-viz", version, about = "Live visual trainer for small image classifiers")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "FERRITE_VIZ_ADDR", default_value = "127.0.0.1:5000")]
    addr: String,

    /// Directory containing the MNIST, FashionMNIST and cifar-10-batches-bin folders.
    #[arg(long, env = "FERRITE_VIZ_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Where exported models are written.
    #[arg(long, env = "FERRITE_VIZ_EXPORT_PATH", default_value = "model.json")]
    export_path: PathBuf,

    /// Worker threads for the numeric code (defaults to one per core).
    #[arg(long, env = "FERRITE_VIZ_THREADS")]
    threads: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure the worker pool")?;
    }

    let settings = SessionSettings {
        data_dir: args.data_dir,
        export_path: args.export_path,
        device: Device::detect(),
        snapshot_interval: 10,
    };
    log::info!("Data directory: {}", settings.data_dir.display());
    log::info!("Compute device: {}", settings.device);

    let server = Server::http(&args.addr)
        .map_err(|e| anyhow!("failed to bind HTTP server on {}: {}", args.addr, e))?;
    log::info!("Listening on http://{}", args.addr);

    let shared_state = Arc::new(AppState::new(settings));

    // One thread per request: the event stream handler blocks for as long as
    // the browser stays connected.
    for request in server.incoming_requests() {
        let state_clone = shared_state.clone();
        std::thread::spawn(move || {
            routes::dispatch(request, state_clone);
        });
    }
    Ok(())
}
