use tokio::sync::mpsc::UnboundedSender;

/// Fire-and-forget route change.
pub trait Navigator: Send + Sync + 'static {
    fn navigate(&self, path: &str);
}

impl Navigator for UnboundedSender<String> {
    fn navigate(&self, path: &str) {
        if self.send(path.to_string()).is_err() {
            tracing::debug!(path, "Navigation dropped, receiver is gone");
        }
    }
}

impl<N: Navigator> Navigator for std::sync::Arc<N> {
    fn navigate(&self, path: &str) {
        (**self).navigate(path);
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn sends_path_to_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.navigate("/dashboard");
        assert_eq!(rx.try_recv().unwrap(), "/dashboard");
    }

    #[test]
    fn closed_receiver_is_not_an_error() {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        drop(rx);
        tx.navigate("/");
    }
}
