use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::error::EcoError;

/// Runs tasks concurrently using tokio and waits for every one of them to settle.
///
/// Unlike a fail-fast join, each task's outcome is returned in input order, so one
/// failure (or panic) never hides the others.
pub async fn run_settled<T, F>(futs: Vec<F>) -> Vec<Result<T, EcoError>>
where
    F: std::future::Future<Output = Result<T, EcoError>> + Send + 'static,
    T: Send + 'static,
{
    let handles: Vec<JoinHandle<Result<T, EcoError>>> =
        futs.into_iter().map(|f| tokio::spawn(f)).collect();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(result) => result,
            Err(join_err) => Err(EcoError::upstream(format!("task did not complete: {}", join_err))),
        })
        .collect()
}
