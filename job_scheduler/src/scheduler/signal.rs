use tokio::sync::watch;

/// Owner side of the shutdown signal. Flipping it is sticky; there is no
/// way back to running.
#[derive(Debug)]
pub(crate) struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn shut_down(&self) {
        // Send only fails with no receivers left, which still records the
        // value for future subscribers.
        let _ = self.sender.send(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.sender.borrow()
    }
}

/// The cancellation context handed to every job body and the dispatcher.
/// A cooperative signal: nothing is aborted, bodies are expected to poll
/// `is_shut_down` or await `wait` and return early.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    receiver: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shut_down(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Completes once the scheduler has been shut down. Also completes if
    /// the scheduler itself is gone.
    pub async fn wait(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                break;
            }
        }
    }
}
