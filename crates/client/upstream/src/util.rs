/// Observer channel for pool events. Disconnected by default: sending is a no-op.
pub struct ServiceStateSender<T>(Option<tokio::sync::mpsc::UnboundedSender<T>>);

impl<T> Default for ServiceStateSender<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> ServiceStateSender<T> {
    pub fn send(&self, val: T) {
        if let Some(sender) = &self.0 {
            let _res = sender.send(val);
        }
    }
}

/// Connected observer: every event sent through the returned sender is received on the other end.
pub fn service_state_channel<T>() -> (ServiceStateSender<T>, tokio::sync::mpsc::UnboundedReceiver<T>) {
    let (sender, recv) = tokio::sync::mpsc::unbounded_channel();
    (ServiceStateSender(Some(sender)), recv)
}
