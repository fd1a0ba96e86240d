//! Server side: request entry point and the per-task serve routine

use std::marker::PhantomData;
use std::sync::Arc;

use crate::content::{ContentSource, ContentStore};
use crate::error::{HandlerError, TransferError};
use crate::handle::{Detached, HandleSlot};
use crate::logger::Logger;
use crate::pool::{TaskHandler, WorkerPool};
use crate::protocol::Status;
use crate::stream::{stream_content, CHUNK_SIZE};
use crate::transfer::ResponseHandle;

pub struct ServeTask<H> {
    pub path: String,
    pub handle: Detached<H>,
}

/// Called by the accept loop for every parsed request. Detaches the handle
/// and queues it; serving happens on a worker.
///
/// A request that arrives after shutdown began is aborted here and still
/// counts as handled.
pub fn handle_request<H: ResponseHandle>(
    pool: &WorkerPool<ServeTask<H>>,
    slot: &mut HandleSlot<H>,
    path: &str,
    logger: &dyn Logger,
) -> Result<(), HandlerError> {
    let handle = slot.detach().ok_or(HandlerError::AlreadyDetached)?;
    let task = ServeTask {
        path: path.to_string(),
        handle,
    };
    if let Err(task) = pool.submit(task) {
        logger.aborted(&task.path, &TransferError::ShutdownRace.to_string());
        task.handle.abort();
    }
    Ok(())
}

pub struct Dispatcher<S, H> {
    store: S,
    logger: Arc<dyn Logger>,
    chunk_size: usize,
    _handle: PhantomData<fn(H)>,
}

impl<S: ContentStore, H: ResponseHandle> Dispatcher<S, H> {
    pub fn new(store: S, logger: Arc<dyn Logger>) -> Self {
        Dispatcher {
            store,
            logger,
            chunk_size: CHUNK_SIZE,
            _handle: PhantomData,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn lookup(&self, path: &str) -> Result<S::Source, TransferError> {
        match self.store.resolve(path) {
            Ok(Some(source)) => Ok(source),
            Ok(None) => Err(TransferError::NotFound),
            Err(e) => Err(TransferError::Resource(e)),
        }
    }
}

impl<S: ContentStore, H: ResponseHandle> TaskHandler<ServeTask<H>> for Dispatcher<S, H> {
    fn process(&self, task: ServeTask<H>) -> Result<(), TransferError> {
        let ServeTask { path, handle } = task;
        let mut handle = handle.attach();

        let source = match self.lookup(&path) {
            Ok(source) => source,
            Err(TransferError::NotFound) => {
                if let Err(e) = handle.send_header(Status::FileNotFound, 0) {
                    handle.abort();
                    return Err(TransferError::Transport(e));
                }
                handle.finish();
                self.logger.not_found(&path);
                return Ok(());
            }
            Err(e) => {
                let _ = handle.send_header(Status::Error, 0);
                handle.abort();
                return Err(e);
            }
        };

        if let Err(e) = handle.send_header(Status::Ok, source.len()) {
            handle.abort();
            return Err(TransferError::Transport(e));
        }
        match stream_content(&mut handle, &source, self.chunk_size) {
            Ok(sent) => {
                handle.finish();
                self.logger.served(&path, sent);
                Ok(())
            }
            Err(e) => {
                handle.abort();
                Err(e.into())
            }
        }
    }

    fn abort(&self, task: ServeTask<H>) {
        self.logger.aborted(&task.path, &TransferError::ShutdownRace.to_string());
        task.handle.abort();
    }
}
