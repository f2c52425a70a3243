use tokio::sync::watch;

/// Reactive bearer credential. `None` means no credential is available yet.
pub type TokenSource = watch::Receiver<Option<String>>;

pub fn token_channel(initial: Option<String>) -> (watch::Sender<Option<String>>, TokenSource) {
    watch::channel(initial)
}

/// Suspends until the source holds a credential. Returns `None` only when the
/// sending side is gone and no credential will ever arrive.
pub async fn wait_until_defined(source: &TokenSource) -> Option<String> {
    let mut source = source.clone();
    let token = source.wait_for(Option::is_some).await.ok()?;
    token.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::task::spawn;
    use tokio_test::{assert_pending, assert_ready_eq};

    #[tokio::test]
    async fn resolves_immediately_when_present() {
        let (_tx, rx) = token_channel(Some("t".to_string()));
        assert_eq!(wait_until_defined(&rx).await.as_deref(), Some("t"));
    }

    #[test]
    fn waits_for_a_later_token() {
        let (tx, rx) = token_channel(None);
        let mut waiting = spawn(wait_until_defined(&rx));
        assert_pending!(waiting.poll());

        tx.send_replace(Some("late".to_string()));
        assert!(waiting.is_woken());
        assert_ready_eq!(waiting.poll(), Some("late".to_string()));
    }

    #[tokio::test]
    async fn closed_source_yields_none() {
        let (tx, rx) = token_channel(None);
        drop(tx);
        assert_eq!(wait_until_defined(&rx).await, None);
    }
}
