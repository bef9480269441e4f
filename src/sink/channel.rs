use crate::sink::{DocumentRecord, DocumentSink, SinkError, SinkResult};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// In-process topic backed by a bounded tokio channel
///
/// `publish` waits while the channel is full, so a slow consumer slows the
/// crawl down instead of growing memory.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<DocumentRecord>,
}

impl ChannelSink {
    /// Creates a sink and the receiver its consumer reads from
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DocumentRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DocumentSink for ChannelSink {
    async fn publish(&self, record: DocumentRecord) -> SinkResult<()> {
        self.tx.send(record).await.map_err(|_| SinkError::Closed)
    }
}
