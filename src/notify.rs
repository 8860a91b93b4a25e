//! Fire-and-forget notification boundary.
//!
//! The pipeline notifies on approval, rejection, and manual-review-required
//! transitions. Delivery failures are the sink's problem; they never roll
//! back a workflow transition, so the trait is infallible from the caller's
//! point of view.

pub trait NotificationSink: Send + Sync {
    fn notify(&self, user_id: &str, subject: &str, message: &str);
}

/// Sink that writes notifications to the tracing log. Useful as a default
/// and in deployments where delivery happens out-of-process.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, user_id: &str, subject: &str, message: &str) {
        tracing::info!(user_id, subject, message, "notification");
    }
}

#[cfg(test)]
pub mod test_support {
    use std::sync::Mutex;

    use super::NotificationSink;

    /// Collects notifications for assertions.
    #[derive(Default)]
    pub struct CollectingNotifier {
        pub sent: Mutex<Vec<(String, String, String)>>,
    }

    impl NotificationSink for CollectingNotifier {
        fn notify(&self, user_id: &str, subject: &str, message: &str) {
            self.sent.lock().expect("notifier lock poisoned").push((
                user_id.to_string(),
                subject.to_string(),
                message.to_string(),
            ));
        }
    }
}
