use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use gfpool::cli::ClientOpts;
use gfpool::config::{ClientSettings, FileConfig};
use gfpool::download::{self, Downloader};
use gfpool::log::TransferLog;
use gfpool::logger;
use gfpool::net::TcpTransport;
use gfpool::pool::{PoolConfig, WorkerPool};
use gfpool::shutdown::{Reason, ShutdownCoordinator};
use gfpool::transfer::Endpoint;
use gfpool::workload::Workload;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let opts = ClientOpts::parse();
    let file = FileConfig::load_optional(opts.config.as_deref())?;
    let settings = ClientSettings::resolve(&opts, &file.client)?;

    let mut workload = Workload::load(&settings.workload)?;
    let logger = logger::build(false, settings.log_file.as_deref());
    let endpoint = Arc::new(Endpoint::new(settings.server.clone(), settings.port));

    let mut downloader = Downloader::new(TcpTransport::default(), Arc::clone(&logger));
    if let Some(path) = &settings.journal {
        downloader = downloader.with_journal(Arc::new(TransferLog::new(path)));
    }

    let pool = Arc::new(WorkerPool::start(
        PoolConfig::new(settings.nthreads, "gfclient").with_target(settings.nrequests),
        downloader,
        logger,
    )?);

    let coordinator = ShutdownCoordinator::new();
    coordinator.install_ctrlc()?;

    let batch = {
        let pool = Arc::clone(&pool);
        let signal = coordinator.signal();
        let requests = settings.nrequests;
        let out_dir = settings.output_dir.clone();
        thread::Builder::new()
            .name("gfclient-producer".into())
            .spawn(move || {
                download::produce(&pool, &mut workload, endpoint, &out_dir, requests);
                let done = if requests == 0 {
                    pool.stop_and_join()
                } else {
                    pool.join()
                };
                signal.trigger(Reason::BatchComplete);
                done
            })
            .context("Failed to spawn producer thread")?
    };

    match coordinator.wait() {
        Reason::Interrupted => {
            coordinator.shutdown(&*pool)?;
            // The producer may hold the worker handles; its join covers them.
            let _ = batch.join();
            let completed = pool.queue().completed();
            eprintln!("Stopped after {} of {} requests", completed, settings.nrequests);
            Ok(ExitCode::from(130))
        }
        Reason::BatchComplete => {
            let done = batch
                .join()
                .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;
            done?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
