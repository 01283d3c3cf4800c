use std::future::Future;
use std::time::Duration;

/// Runs `operation` until it succeeds, the error is non-retryable, or the
/// backoff iterator is exhausted.
///
/// The first run is not a retry: a backoff of `n` items allows `n + 1` runs
/// in total. `condition` decides whether an error is worth retrying; a
/// non-retryable error is returned immediately without consuming backoff.
/// The last error is returned once the budget is spent.
pub async fn retry<B, Op, Fut, T, E, C>(
    backoff: B,
    mut operation: Op,
    condition: C,
) -> Result<T, E>
where
    B: IntoIterator<Item = Duration>,
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    let mut backoff = backoff.into_iter();
    loop {
        let err = match operation().await {
            Ok(item) => return Ok(item),
            Err(err) => err,
        };
        if !condition(&err) {
            return Err(err);
        }
        match backoff.next() {
            // cool off before the reattempt
            Some(delay) => tokio::time::sleep(delay).await,
            // ran out of backoff, surface the last error
            None => return Err(err),
        }
    }
}
