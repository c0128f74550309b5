use tokio::sync::mpsc;

/// Where a refresh stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    Indexing,
    /// Another refresh holds the workspace lease.
    Paused,
    Done,
    Failed,
}

/// One element of the refresh progress stream. A refresh produces a finite
/// sequence of these ending in exactly one terminal status (`Done`,
/// `Failed`, or `Paused`).
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Monotone within one refresh, in `[0, 1]`.
    pub progress: f32,
    pub description: String,
    pub status: RefreshStatus,
}

/// Enforces the non-decreasing progress invariant and shields the refresh
/// from a dropped receiver.
pub(crate) struct ProgressEmitter {
    tx: mpsc::Sender<ProgressUpdate>,
    last: f32,
}

impl ProgressEmitter {
    pub fn new(tx: mpsc::Sender<ProgressUpdate>) -> Self {
        Self { tx, last: 0.0 }
    }

    pub async fn emit(&mut self, progress: f32, description: impl Into<String>, status: RefreshStatus) {
        let clamped = progress.clamp(0.0, 1.0).max(self.last);
        self.last = clamped;
        // A consumer that stopped listening must not abort the refresh.
        let _ = self
            .tx
            .send(ProgressUpdate {
                progress: clamped,
                description: description.into(),
                status,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn progress_never_decreases() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut emitter = ProgressEmitter::new(tx);

        emitter.emit(0.5, "halfway", RefreshStatus::Indexing).await;
        emitter.emit(0.3, "stale", RefreshStatus::Indexing).await;
        emitter.emit(0.9, "almost", RefreshStatus::Indexing).await;
        drop(emitter);

        let values: Vec<f32> = {
            let mut out = Vec::new();
            while let Some(update) = rx.recv().await {
                out.push(update.progress);
            }
            out
        };
        assert_eq!(values, vec![0.5, 0.5, 0.9]);
    }

    #[tokio::test]
    async fn dropped_receiver_is_tolerated() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut emitter = ProgressEmitter::new(tx);
        emitter.emit(1.0, "done", RefreshStatus::Done).await;
    }
}
