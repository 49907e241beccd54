use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

/// A human-readable notice for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new("Success", message)
    }
}

/// Where alerts raised by the engine are delivered. Nothing is read back.
#[cfg_attr(test, mockall::automock)]
pub trait AlertSurface: Send + Sync {
    fn show(&self, alert: Alert);
}

impl AlertSurface for mpsc::UnboundedSender<Alert> {
    fn show(&self, alert: Alert) {
        if self.send(alert).is_err() {
            warn!("Failed to deliver alert: receiver dropped.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_surface_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.show(Alert::error("first"));
        tx.show(Alert::success("second"));
        assert_eq!(rx.try_recv().unwrap(), Alert::new("Error", "first"));
        assert_eq!(rx.try_recv().unwrap(), Alert::new("Success", "second"));
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel::<Alert>();
        drop(rx);
        tx.show(Alert::error("nobody listening"));
    }
}
