use super::*;

const BLOCK_CHANNEL_CAPACITY: usize = 64;

/// A share that met the network target, on its way to the node.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCandidate {
    pub block: FoundBlock,
    pub worker: String,
}

pub(crate) fn block_channel() -> (mpsc::Sender<BlockCandidate>, mpsc::Receiver<BlockCandidate>) {
    mpsc::channel(BLOCK_CHANNEL_CAPACITY)
}

pub(crate) struct BlockSubmitter {
    pub(crate) daemon: Arc<dyn Daemon>,
    pub(crate) events: EventSender,
    pub(crate) metatron: Arc<Metatron>,
    pub(crate) refresh: mpsc::Sender<()>,
}

impl BlockSubmitter {
    pub(crate) fn spawn(
        self,
        mut blocks: mpsc::Receiver<BlockCandidate>,
        cancel: CancellationToken,
        tasks: &mut JoinSet<()>,
    ) {
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    candidate = blocks.recv() => {
                        let Some(candidate) = candidate else {
                            break;
                        };

                        self.submit(candidate).await;
                    }
                }
            }

            info!("Shutting down block submitter");
        });
    }

    async fn submit(&self, candidate: BlockCandidate) {
        let BlockCandidate { block, worker } = candidate;

        info!(
            "Submitting block {} at height {} found by {worker}",
            block.hash, block.height
        );

        let reason = match self.daemon.submit_block(&block.hex).await {
            Ok(Some(reason)) => Some(reason),
            Ok(None) if self.daemon.has_block(&block.hash).await => None,
            Ok(None) => Some("block not found after submission".into()),
            Err(err) => Some(err.to_string()),
        };

        match &reason {
            None => {
                info!("Block {} accepted by the node", block.hash);
                self.metatron.add_block();
            }
            Some(reason) => warn!("Block {} rejected by the node: {reason}", block.hash),
        }

        self.events.emit(Event::BlockFound(BlockFoundEvent {
            timestamp: None,
            height: block.height,
            block_hash: block.hash,
            worker,
            accepted: reason.is_none(),
            reason,
        }));

        self.refresh.try_send(()).ok();
    }
}
