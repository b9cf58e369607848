//! Delivery of received messages to the host application.

use std::sync::mpsc;

/// Receives each successfully decoded message, exactly once, in accept order.
///
/// Invoked on the listener's worker thread between `start` returning and
/// `stop` returning, never concurrently for one listener. An implementation
/// that needs the message on another thread should hand it off without
/// blocking so a slow consumer cannot stall the accept loop; an
/// [`mpsc::Sender`] does exactly that.
pub trait MessageSink: Send {
    fn on_received(&self, message: String);
}

impl<F> MessageSink for F
where
    F: Fn(String) + Send,
{
    fn on_received(&self, message: String) {
        self(message)
    }
}

/// Ordered, non-blocking hand-off to a consumer thread.
///
/// A disconnected receiver drops the message rather than failing the
/// listener.
impl MessageSink for mpsc::Sender<String> {
    fn on_received(&self, message: String) {
        let _ = self.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_sink_receives_message() {
        let received = Mutex::new(Vec::new());
        let sink = |message: String| received.lock().unwrap().push(message);
        sink.on_received("first".to_string());
        sink.on_received("second".to_string());
        assert_eq!(*received.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_channel_sink_preserves_order() {
        let (tx, rx) = mpsc::channel();
        tx.on_received("first".to_string());
        tx.on_received("second".to_string());
        assert_eq!(rx.recv().unwrap(), "first");
        assert_eq!(rx.recv().unwrap(), "second");
    }

    #[test]
    fn test_channel_sink_tolerates_disconnected_receiver() {
        let (tx, rx) = mpsc::channel::<String>();
        drop(rx);
        tx.on_received("lost".to_string());
    }
}
