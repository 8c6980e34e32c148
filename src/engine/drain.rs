//! Drain protocol: relay a source into a group's intake, one item at a time.

use crate::error::{Error, Result};
use crate::source::{Sink, Source};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Pump `source` into `intake` until the source is exhausted, then close the
/// intake by dropping it.
///
/// Each forward waits for a worker to take the previous item, so the source
/// is throttled to the pool's pace. Returns the number of items forwarded
/// alongside the source's own outcome, or `WorkersExited` if the intake
/// closed before the source was exhausted.
pub(crate) async fn relay<W: Send + 'static>(
    group: &str,
    source: Box<dyn Source<W>>,
    intake: mpsc::Sender<W>,
) -> (u64, Result<()>) {
    let (relay_tx, mut relay_rx) = mpsc::channel(1);
    let pump = tokio::spawn(source.pump(Sink::new(relay_tx)));

    let mut forwarded = 0u64;
    let mut abandoned = false;
    while let Some(item) = relay_rx.recv().await {
        if intake.send(item).await.is_err() {
            warn!(group, forwarded, "every worker has exited, abandoning source");
            abandoned = true;
            break;
        }
        forwarded += 1;
    }
    drop(intake);
    drop(relay_rx);
    debug!(group, forwarded, "intake closed");

    let outcome = match pump.await {
        Ok(Ok(())) if abandoned => Err(Error::WorkersExited {
            group: group.to_string(),
            forwarded,
        }),
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(group, error = %e, "source failed");
            Err(Error::Upstream {
                group: group.to_string(),
                source: Box::new(e),
            })
        }
        Err(e) => {
            error!(group, error = %e, "source panicked");
            Err(Error::SourcePanicked {
                group: group.to_string(),
            })
        }
    };

    (forwarded, outcome)
}
