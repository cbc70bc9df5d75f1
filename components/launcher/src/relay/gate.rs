//! Startup gate between the relay task and its owner.

// External crates
use std::sync::Arc;
use tokio::sync::watch;

/// One-shot startup latch.
///
/// The gate starts closed and opens exactly once, on the first call to
/// [`StartupGate::signal`]. The value passed to that first call is kept and
/// handed to every waiter, current and future. Later signals are ignored.
///
/// The latch is a `watch` channel holding an `Option<T>`: the state lives in
/// the channel rather than in the notification, so a signal that happens
/// before `wait` is never lost.
///
/// Clones share the same latch.
#[derive(Debug)]
pub struct StartupGate<T = ()> {
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for StartupGate<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone> Default for StartupGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> StartupGate<T> {
    /// A closed gate.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Open the gate with `value`.
    ///
    /// Returns `true` if this call opened the gate, `false` if it was already
    /// open, in which case nothing changes.
    pub fn signal(&self, value: T) -> bool {
        let mut value = Some(value);
        self.tx.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = value.take();
            true
        })
    }

    /// Wait until the gate is open and return the value it was opened with.
    ///
    /// Returns immediately if the gate is already open.
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().as_ref() {
                return value.clone();
            }
            // `self` owns a sender, so the channel cannot close under us.
            let _ = rx.changed().await;
        }
    }
}

impl StartupGate<()> {
    /// Open a plain boolean gate.
    pub fn open(&self) -> bool {
        self.signal(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn signal_before_wait_returns_immediately() {
        let gate = StartupGate::<()>::new();
        assert!(gate.open());

        timeout(Duration::from_millis(100), gate.wait())
            .await
            .expect("wait should not block on an open gate");
    }

    #[tokio::test]
    async fn second_signal_has_no_effect() {
        let gate = StartupGate::new();
        assert!(gate.signal(1u16));
        assert!(!gate.signal(2u16));
        assert_eq!(gate.wait().await, 1);
        assert_eq!(gate.clone().wait().await, 1);
    }

    #[tokio::test]
    async fn closed_gate_blocks_waiters() {
        let gate = StartupGate::<()>::new();
        assert!(timeout(Duration::from_millis(50), gate.wait()).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn all_waiters_are_released() {
        let gate = StartupGate::new();

        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.wait().await })
            })
            .collect();

        tokio::task::yield_now().await;
        gate.signal("ready");

        for waiter in waiters {
            let value = timeout(Duration::from_secs(5), waiter)
                .await
                .expect("waiter released")
                .unwrap();
            assert_eq!(value, "ready");
        }

        // Late waiters see the same value.
        assert_eq!(gate.wait().await, "ready");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_signal_and_wait_never_loses_wakeup() {
        for round in 0..200u32 {
            let gate = StartupGate::new();
            let signaller = gate.clone();

            let waiter = tokio::spawn({
                let gate = gate.clone();
                async move { gate.wait().await }
            });
            let signal = tokio::spawn(async move { signaller.signal(round) });

            signal.await.unwrap();
            let seen = timeout(Duration::from_secs(5), waiter)
                .await
                .expect("no lost wakeup")
                .unwrap();
            assert_eq!(seen, round);
        }
    }
}
