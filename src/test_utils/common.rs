use std::time::Duration;

use tokio::time::sleep;
use tokio::time::Instant;

pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or five seconds pass. Returns the final outcome.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Give session workers a moment to prove a negative
pub async fn settle() {
    sleep(Duration::from_millis(100)).await;
}
