use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{PageId, Result, SiloError, PAGE_SIZE};

use super::DiskManager;

/// Capacity of the request queue between callers and the worker thread
const REQUEST_QUEUE_DEPTH: usize = 128;

/// A disk I/O request. Each request carries the channel its result is sent back on.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        done: Sender<Result<Bytes>>,
    },
    Write {
        page_id: PageId,
        data: Bytes,
        done: Sender<Result<()>>,
    },
}

impl DiskRequest {
    pub fn page_id(&self) -> PageId {
        match self {
            DiskRequest::Read { page_id, .. } | DiskRequest::Write { page_id, .. } => *page_id,
        }
    }
}

/// DiskScheduler serializes page I/O onto a background worker thread.
/// Callers of the `*_sync` methods block until the worker has completed their request.
pub struct DiskScheduler {
    disk_manager: Arc<DiskManager>,
    /// Dropped first on shutdown so the worker sees a closed queue
    request_sender: Option<Sender<DiskRequest>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(REQUEST_QUEUE_DEPTH);

        let dm = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || Self::run_worker(dm, receiver));

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the worker thread.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or_else(|| SiloError::DiskScheduler("scheduler is shut down".to_string()))?;
        sender
            .send(request)
            .map_err(|e| SiloError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Reads a page and waits for the result.
    pub fn read_page_sync(&self, page_id: PageId) -> Result<Bytes> {
        let (done, completion) = bounded(1);
        self.schedule(DiskRequest::Read { page_id, done })?;
        Self::wait(completion)?
    }

    /// Writes a page and waits for the write to reach the disk manager.
    pub fn write_page_sync(&self, page_id: PageId, data: Bytes) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (done, completion) = bounded(1);
        self.schedule(DiskRequest::Write {
            page_id,
            data,
            done,
        })?;
        Self::wait(completion)?
    }

    fn wait<T>(completion: Receiver<T>) -> Result<T> {
        completion
            .recv()
            .map_err(|e| SiloError::DiskScheduler(format!("Failed to receive completion: {}", e)))
    }

    /// Worker loop: runs until every sender is dropped and the queue is drained.
    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<DiskRequest>) {
        for request in receiver.iter() {
            Self::process_request(&disk_manager, request);
        }
        log::trace!("disk worker exiting");
    }

    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        log::trace!("disk request for {}", request.page_id());
        match request {
            DiskRequest::Read { page_id, done } => {
                let mut buf = BytesMut::zeroed(PAGE_SIZE);
                let result = disk_manager
                    .read_page(page_id, &mut buf)
                    .map(|()| buf.freeze());
                // The requester may have given up waiting; nothing to report then.
                let _ = done.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                done,
            } => {
                let _ = done.send(disk_manager.write_page(page_id, &data));
            }
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.request_sender.take();

        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                log::warn!("disk worker panicked");
            }
        }
    }
}
