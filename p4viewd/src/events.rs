use tokio::sync::mpsc;

/// Notifications for the file-manager layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    Info(String),
    Error(String),
    OperationCompleted(String),
    /// A batch finished successfully; the owner should re-scan.
    ItemVersionsChanged,
}

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<PluginEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PluginEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: PluginEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("event receiver is gone, dropping event");
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        self.send(PluginEvent::Info(text.into()));
    }

    pub fn error(&self, text: impl Into<String>) {
        self.send(PluginEvent::Error(text.into()));
    }

    pub fn completed(&self, text: impl Into<String>) {
        self.send(PluginEvent::OperationCompleted(text.into()));
    }

    pub fn versions_changed(&self) {
        self.send(PluginEvent::ItemVersionsChanged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.info("start");
        sink.completed("done");
        sink.versions_changed();
        assert_eq!(rx.try_recv().unwrap(), PluginEvent::Info("start".into()));
        assert_eq!(
            rx.try_recv().unwrap(),
            PluginEvent::OperationCompleted("done".into())
        );
        assert_eq!(rx.try_recv().unwrap(), PluginEvent::ItemVersionsChanged);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_receiver_is_not_an_error() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.error("nobody listens");
    }
}
