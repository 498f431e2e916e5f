use tokio::sync::watch;

pub type ShutdownSender = watch::Sender<bool>;
pub type ShutdownReceiver = watch::Receiver<bool>;

/// One sender, many receivers; triggering is idempotent.
pub fn channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

pub fn trigger(sender: &ShutdownSender) {
    let _ = sender.send(true);
}

pub fn is_triggered(receiver: &ShutdownReceiver) -> bool {
    *receiver.borrow()
}

/// Resolves once shutdown has been triggered. Also resolves if the sender
/// is dropped, so orphaned tasks wind down instead of hanging.
pub async fn wait(mut receiver: ShutdownReceiver) {
    loop {
        if *receiver.borrow() {
            return;
        }
        if receiver.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_resolves_on_trigger() {
        let (tx, rx) = channel();
        assert!(!is_triggered(&rx));
        trigger(&tx);
        wait(rx).await;
    }

    #[tokio::test]
    async fn wait_resolves_on_sender_drop() {
        let (tx, rx) = channel();
        drop(tx);
        wait(rx).await;
    }
}
