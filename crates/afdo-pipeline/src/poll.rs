//! Bounded wait for an upstream artifact

use crate::error::{PipelineError, PipelineResult};
use crate::store::RemoteStore;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Wait until `url` exists in `store`
///
/// Checks immediately, then every `period` until `timeout` has elapsed.
pub fn wait_for_artifact(
    store: &dyn RemoteStore,
    url: &str,
    timeout: Duration,
    period: Duration,
) -> PipelineResult<()> {
    let start = Instant::now();

    loop {
        if store.exists(url)? {
            info!(url, waited_secs = start.elapsed().as_secs(), "found artifact");
            return Ok(());
        }

        let waited = start.elapsed();
        if waited >= timeout {
            info!(url, "artifact did not appear before timeout");
            return Err(PipelineError::Timeout { url: url.to_string(), waited });
        }

        debug!(url, "artifact not present yet");
        thread::sleep(period.min(timeout - waited));
    }
}
