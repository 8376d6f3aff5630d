mod observer;
mod target_group;

use std::time::{Duration, Instant};

pub use observer::{
    Change, NotRegistered, Notifier, Observer, available_observers, register, subscribe,
};
pub use target_group::{
    ADDRESS_LABEL, INSTANCE_LABEL, LabelSet, METRICS_PATH_LABEL, SCHEME_LABEL, TargetGroup,
    target_key,
};

use crate::Context;

/// `run` is a simple helper for periodic service discovery, it calls `refresh`
/// on every tick and publishes the result. The first tick completes
/// immediately.
///
/// Every call gets a clone of `cx`, so canceling it aborts the in-flight
/// refresh too. Failed refreshes are logged and skipped, the next tick simply
/// tries again. The loop ends once `cx` is done.
pub async fn run<L>(mut observer: Observer, interval: Duration, cx: Context, mut refresh: L)
where
    L: AsyncFnMut(Context) -> crate::Result<Vec<TargetGroup>>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            reason = cx.done() => {
                debug!(message = "observer stopped", observer = observer.name(), %reason);
                break;
            },
            _ = ticker.tick() => {}
        }

        let start = Instant::now();
        match refresh(cx.clone()).await {
            Ok(groups) => {
                let targets = groups.iter().map(|group| group.targets.len()).sum::<usize>();
                debug!(
                    message = "refresh target groups finished",
                    observer = observer.name(),
                    groups = groups.len(),
                    targets,
                    elapsed = ?start.elapsed(),
                );

                if let Err(err) = observer.publish(groups) {
                    warn!(message = "publish target groups failed", %err);
                    break;
                }
            }
            Err(err) => {
                if cx.err().is_some() {
                    // shutting down, the failure is caused by it
                    continue;
                }

                warn!(
                    message = "refresh target groups failed",
                    observer = observer.name(),
                    %err,
                    elapsed = ?start.elapsed(),
                );
            }
        }
    }
}
