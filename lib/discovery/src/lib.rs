pub mod stackit;

use framework::Context;
pub use framework::observe::{LabelSet, TargetGroup};

#[macro_use]
extern crate tracing;

/// Discoverer provides information about target groups.
///
/// Every successful `refresh` returns the complete current state, it
/// replaces whatever the previous call returned. `Discoverer` does not know
/// if an actual change happened, diffing is up to the consumer.
///
/// `refresh` must give up as soon as `cx` is done.
#[async_trait::async_trait]
pub trait Discoverer: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn refresh(&self, cx: &Context) -> Result<Vec<TargetGroup>, Self::Error>;
}
