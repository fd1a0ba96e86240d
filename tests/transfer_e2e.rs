use anyhow::Result;
use gfpool::content::{ContentStore, Delayed, RootStore};
use gfpool::dispatch::{self, Dispatcher, ServeTask};
use gfpool::download::{self, Downloader};
use gfpool::error::TransferError;
use gfpool::logger::NoopLogger;
use gfpool::net::{self, TcpResponse, TcpTransport};
use gfpool::pool::{PoolConfig, WorkerPool};
use gfpool::protocol::Status;
use gfpool::shutdown::{Reason, ShutdownCoordinator, ShutdownSignal};
use gfpool::transfer::{Endpoint, FetchContext, Transport};
use gfpool::workload::Workload;
use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn write_file(path: &Path, size: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = std::fs::File::create(path)?;
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    f.write_all(&data)?;
    Ok(())
}

struct Server {
    port: u16,
    pool: Arc<WorkerPool<ServeTask<TcpResponse>>>,
    signal: ShutdownSignal,
    _coordinator: ShutdownCoordinator,
    acceptor: thread::JoinHandle<Result<()>>,
}

impl Server {
    fn start<S: ContentStore>(store: S, threads: usize) -> Result<Server> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let pool = Arc::new(WorkerPool::start(
            PoolConfig::new(threads, "e2e-srv"),
            Dispatcher::<S, TcpResponse>::new(store, Arc::new(NoopLogger)),
            Arc::new(NoopLogger),
        )?);
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.signal();
        let acceptor = {
            let pool = Arc::clone(&pool);
            let signal = signal.clone();
            thread::spawn(move || {
                net::serve(
                    listener,
                    |slot, path| dispatch::handle_request(&*pool, slot, path, &NoopLogger),
                    &signal,
                )
            })
        };
        Ok(Server {
            port,
            pool,
            signal,
            _coordinator: coordinator,
            acceptor,
        })
    }

    fn stop(self) -> Result<usize> {
        self.signal.trigger(Reason::Interrupted);
        self.acceptor
            .join()
            .map_err(|_| anyhow::anyhow!("accept thread panicked"))??;
        self.pool.stop_and_join()
    }
}

#[test]
fn batch_download_matches_served_bytes() -> Result<()> {
    let srv_root = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    write_file(&srv_root.path().join("a.txt"), 8 * 1024)?;
    write_file(&srv_root.path().join("dir1/b.bin"), 200_000)?;
    write_file(&srv_root.path().join("empty"), 0)?;

    let server = Server::start(RootStore::new(srv_root.path())?, 4)?;

    let pool = WorkerPool::start(
        PoolConfig::new(8, "e2e-dl").with_target(8),
        Downloader::new(TcpTransport::default(), Arc::new(NoopLogger)),
        Arc::new(NoopLogger),
    )?;
    let mut workload = Workload::parse("/a.txt\n/dir1/b.bin\n/empty\n/missing\n")?;
    let endpoint = Arc::new(Endpoint::new("127.0.0.1", server.port));
    assert_eq!(download::produce(&pool, &mut workload, endpoint, out.path(), 8), 8);
    assert_eq!(pool.join()?, 8);

    for (name, counter) in [("a.txt", 0), ("dir1/b.bin", 1), ("empty", 2), ("a.txt", 4), ("dir1/b.bin", 5)] {
        let got = std::fs::read(out.path().join(format!("{}-{:06}", name, counter)))?;
        let want = std::fs::read(srv_root.path().join(name))?;
        assert_eq!(got, want, "{} #{}", name, counter);
    }
    assert!(!out.path().join("missing-000003").exists());
    assert!(!out.path().join("missing-000007").exists());

    assert_eq!(server.stop()?, 8);
    Ok(())
}

#[test]
fn fewer_requests_than_workers() -> Result<()> {
    let srv_root = tempfile::tempdir()?;
    let out = tempfile::tempdir()?;
    write_file(&srv_root.path().join("f"), 1000)?;
    let server = Server::start(RootStore::new(srv_root.path())?, 2)?;

    let pool = WorkerPool::start(
        PoolConfig::new(8, "e2e-dl").with_target(5),
        Downloader::new(TcpTransport::default(), Arc::new(NoopLogger)),
        Arc::new(NoopLogger),
    )?;
    let mut workload = Workload::parse("/f\n")?;
    let endpoint = Arc::new(Endpoint::new("127.0.0.1", server.port));
    download::produce(&pool, &mut workload, endpoint, out.path(), 5);
    assert_eq!(pool.join()?, 5);
    assert_eq!(std::fs::read_dir(out.path())?.count(), 5);

    server.stop()?;
    Ok(())
}

#[test]
fn server_shutdown_finishes_in_flight_and_aborts_queued() -> Result<()> {
    let srv_root = tempfile::tempdir()?;
    write_file(&srv_root.path().join("slow"), 4096)?;
    let store = Delayed::new(RootStore::new(srv_root.path())?, Duration::from_millis(1500));
    let server = Server::start(store, 2)?;
    let port = server.port;

    // Staggered so the first two are picked up by workers before the rest
    // are accepted.
    let clients: Vec<_> = (0..4)
        .map(|_| {
            thread::sleep(Duration::from_millis(150));
            thread::spawn(move || {
                let endpoint = Endpoint::new("127.0.0.1", port);
                let mut sink = Vec::new();
                let mut ctx = FetchContext::new("/slow", &endpoint, &mut sink);
                let res = TcpTransport::default().perform(&mut ctx);
                let status = ctx.status();
                (res, status, sink.len())
            })
        })
        .collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    while server.pool.queue().len() != 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(server.pool.queue().len(), 2);
    assert_eq!(server.stop()?, 2);

    let mut served = 0;
    let mut dropped = 0;
    for c in clients {
        match c.join().map_err(|_| anyhow::anyhow!("client panicked"))? {
            (Ok(()), Status::Ok, 4096) => served += 1,
            (Err(TransferError::Transport(_)), _, 0) => dropped += 1,
            (res, status, n) => panic!("unexpected outcome {:?} {} {}", res.err(), status, n),
        }
    }
    assert_eq!((served, dropped), (2, 2));
    Ok(())
}
