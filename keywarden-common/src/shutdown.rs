//! Shutdown signalling.

use tokio::sync::watch;

/// The daemon's shutdown signal: sent once (SIGINT/SIGTERM or a fatal server
/// error), observed by the API server and the session expirer. Clone to hand
/// a handle to another task; any clone can send, every clone sees the
/// signal, and a handle cloned after the fact sees it immediately.
#[derive(Clone, Debug)]
pub struct ShutdownChannel {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl ShutdownChannel {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Signal shutdown. Sending more than once is harmless.
    pub fn send(&self) {
        let _ = self.tx.send(true);
    }

    /// Wait for the signal; resolves immediately if it was already sent.
    pub async fn recv(&mut self) {
        // Every handle owns a sender, so the channel can't close under us.
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

impl Default for ShutdownChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn multiple_sends_are_harmless() {
        let shutdown = ShutdownChannel::new();
        shutdown.send();
        shutdown.send();
    }

    #[test]
    fn recv_resolves_after_send() {
        let shutdown = ShutdownChannel::new();
        let mut observer = shutdown.clone();

        let mut recv = tokio_test::task::spawn(observer.recv());
        tokio_test::assert_pending!(recv.poll());

        shutdown.send();

        assert!(recv.is_woken());
        tokio_test::assert_ready!(recv.poll());
    }

    #[test]
    fn late_subscribers_see_the_signal() {
        let shutdown = ShutdownChannel::new();
        shutdown.send();

        let mut late = shutdown.clone();
        let mut recv = tokio_test::task::spawn(late.recv());
        tokio_test::assert_ready!(recv.poll());
    }
}
