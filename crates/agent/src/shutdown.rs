use tokio::sync::watch;

/// Cooperative cancellation flag shared by every worker of a run.
///
/// Wraps the receiving half of a `watch<bool>`; `true` means stop. A handle
/// whose sender has gone away never reports a shutdown.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: Option<watch::Receiver<bool>>,
}

impl Shutdown {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A handle that is never signalled.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_signalled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once shutdown is signalled; pends forever otherwise.
    pub async fn signalled(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            if rx.wait_for(|stop| *stop).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::never()
    }
}
