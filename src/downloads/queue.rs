//! In-process download work queue

use crate::error::{Error, Result};
use crate::types::DownloadRecord;
use tokio::sync::mpsc;

/// Producer side of the download queue
///
/// Cheap to clone; every clone feeds the same consumer. Enqueueing never
/// blocks.
#[derive(Clone, Debug)]
pub struct DownloadQueue {
    tx: mpsc::UnboundedSender<DownloadRecord>,
}

/// Consumer side of the download queue
pub type DownloadReceiver = mpsc::UnboundedReceiver<DownloadRecord>;

/// Create a connected queue and receiver
pub fn download_queue() -> (DownloadQueue, DownloadReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DownloadQueue { tx }, rx)
}

impl DownloadQueue {
    /// Hand a record to the consumer
    ///
    /// Fails with [`Error::QueueClosed`] once the receiver is gone.
    pub fn enqueue(&self, record: DownloadRecord) -> Result<()> {
        self.tx.send(record).map_err(|_| Error::QueueClosed)
    }

    /// Whether the receiver has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
