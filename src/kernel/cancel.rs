use tokio_util::sync::CancellationToken;

/// One connect attempt. Results are only accepted while its epoch is current.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub epoch: u64,
    pub token: CancellationToken,
}

/// Tracks the live attempt so stale connect results can be rejected.
///
/// `stop()` mid-connect cannot abort a future that is already running on
/// another task; it cancels the token and bumps the epoch instead, and the
/// late result is closed on arrival.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    epoch: u64,
    token: Option<CancellationToken>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any previous attempt and opens a new epoch.
    pub fn begin(&mut self) -> Attempt {
        self.cancel();
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        Attempt {
            epoch: self.epoch,
            token,
        }
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.token.is_some() && self.epoch == epoch
    }

    /// Idempotent.
    pub fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.epoch += 1;
    }
}
