use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::net::TcpListener;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use gfpool::cli::ServerOpts;
use gfpool::config::{ContentBacking, FileConfig, ServerSettings};
use gfpool::content::{ContentMap, ContentStore, Delayed, RootStore};
use gfpool::dispatch::{self, Dispatcher};
use gfpool::logger::{self, Logger};
use gfpool::net::{self, TcpResponse};
use gfpool::pool::{PoolConfig, WorkerPool};
use gfpool::shutdown::{Reason, ShutdownCoordinator};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let opts = ServerOpts::parse();
    let file = FileConfig::load_optional(opts.config.as_deref())?;
    let settings = ServerSettings::resolve(&opts, &file.server)?;
    let logger = logger::build(settings.verbose, settings.log_file.as_deref());

    println!("Starting gfserverd:");
    println!("  Port: {}", settings.port);
    println!("  Threads: {}", settings.nthreads);
    match &settings.content {
        ContentBacking::Map(path) => {
            let map = ContentMap::load(path)?;
            println!("  Content: {} ({} entries)", path.display(), map.len());
            serve_store(Delayed::new(map, settings.delay), &settings, logger)
        }
        ContentBacking::Root(dir) => {
            let store = RootStore::new(dir)?;
            println!("  Root: {}", store.root().display());
            serve_store(Delayed::new(store, settings.delay), &settings, logger)
        }
    }
}

fn serve_store<S: ContentStore>(
    store: S,
    settings: &ServerSettings,
    logger: Arc<dyn Logger>,
) -> Result<()> {
    let pool = Arc::new(WorkerPool::start(
        PoolConfig::new(settings.nthreads, "gfserverd"),
        Dispatcher::<S, TcpResponse>::new(store, Arc::clone(&logger)),
        Arc::clone(&logger),
    )?);
    let listener = TcpListener::bind(("0.0.0.0", settings.port))
        .with_context(|| format!("Failed to bind port {}", settings.port))?;

    let coordinator = ShutdownCoordinator::new();
    coordinator.install_ctrlc()?;

    let acceptor = {
        let pool = Arc::clone(&pool);
        let signal = coordinator.signal();
        thread::Builder::new()
            .name("gfserverd-accept".into())
            .spawn(move || {
                let served = net::serve(
                    listener,
                    |slot, path| dispatch::handle_request(&*pool, slot, path, &*logger),
                    &signal,
                );
                // An accept loop that dies on its own still takes the daemon down.
                signal.trigger(Reason::Interrupted);
                served
            })
            .context("Failed to spawn accept thread")?
    };

    coordinator.wait();
    let accepted = acceptor
        .join()
        .map_err(|_| anyhow!("accept thread panicked"))?;
    let completed = coordinator.shutdown(&*pool)?;
    accepted?;
    println!("Shut down after {} requests", completed);
    Ok(())
}
