//! Generation counter used to cancel delayed state changes.
//!
//! A delayed callback captures the epoch current when it was scheduled and
//! only runs if nothing advanced the counter in the meantime. Superseding a
//! movement is therefore a single atomic increment; no task handle is kept.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Monotonic movement epoch carried by every moving entity.
#[derive(Debug, Default)]
pub struct MovementToken {
    epoch: AtomicU64,
}

impl MovementToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// The epoch a newly scheduled callback should capture.
    pub fn current(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Invalidates every callback scheduled so far and returns the new epoch.
    pub fn advance(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}

/// Anything that owns a [`MovementToken`].
pub trait Epoched {
    fn movement_token(&self) -> &MovementToken;
}

impl Epoched for MovementToken {
    fn movement_token(&self) -> &MovementToken {
        self
    }
}

/// Runs `apply` after `delay` if `owner`'s token still holds `epoch`.
///
/// The token can still advance while `apply` waits on a lock, so `apply`
/// must check [`MovementToken::is_current`] again once it holds the state it
/// writes. The returned handle resolves to `true` when the callback ran.
/// Callers normally drop it.
pub fn schedule<T, F, Fut>(owner: Arc<T>, epoch: u64, delay: Duration, apply: F) -> JoinHandle<bool>
where
    T: Epoched + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !owner.movement_token().is_current(epoch) {
            return false;
        }
        apply().await;
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn advance_invalidates_previous_epoch() {
        let token = MovementToken::new();
        let first = token.advance();
        assert!(token.is_current(first));
        let second = token.advance();
        assert!(!token.is_current(first));
        assert!(token.is_current(second));
    }

    #[tokio::test]
    async fn superseded_callback_does_not_apply() {
        let token = Arc::new(MovementToken::new());
        let applied = Arc::new(AtomicBool::new(false));

        let epoch = token.advance();
        let flag = applied.clone();
        let handle = schedule(token.clone(), epoch, Duration::from_millis(30), move || async move {
            flag.store(true, Ordering::SeqCst);
        });

        token.advance();
        assert!(!handle.await.unwrap());
        assert!(!applied.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn current_callback_applies() {
        let token = Arc::new(MovementToken::new());
        let applied = Arc::new(AtomicBool::new(false));
        let epoch = token.advance();
        let flag = applied.clone();
        let ran = schedule(token, epoch, Duration::from_millis(5), move || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();
        assert!(ran);
        assert!(applied.load(Ordering::SeqCst));
    }
}
