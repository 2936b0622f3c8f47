use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use telemetry_scheduler::remote::Backoff;

/// Backoff that records requested durations and returns at once.
#[derive(Default)]
pub struct RecordingBackoff {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingBackoff {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backoff for RecordingBackoff {
    async fn sleep(&self, delay: Duration) {
        self.sleeps.lock().unwrap().push(delay);
    }
}
