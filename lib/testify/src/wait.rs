use std::time::Duration;

use tokio::time::{Instant, sleep};

const MIN_DELAY: Duration = Duration::from_millis(5);
const MAX_DELAY: Duration = Duration::from_millis(500);

/// Polls `condition` until it holds, panics once `timeout` elapsed.
///
/// The pause between attempts doubles every round, up to 500ms.
pub async fn wait_for<F>(timeout: Duration, mut condition: F)
where
    F: AsyncFnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut delay = MIN_DELAY;

    while !condition().await {
        if Instant::now() > deadline {
            panic!("condition not satisfied within {timeout:?}");
        }

        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}
