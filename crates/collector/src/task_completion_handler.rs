use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Waits for a spawned task and reports how it ended.
///
/// Success is logged at debug level, errors and panics at error level. The
/// token is cancelled whatever the outcome so the rest of the program shuts
/// down with the task. Returns whether the task succeeded.
pub async fn task_completion_handler<T, E>(
    handle: JoinHandle<Result<T, E>>,
    token: CancellationToken,
    task_name: &str,
) -> bool
where
    E: std::fmt::Display,
{
    let succeeded = match handle.await {
        Ok(Ok(_)) => {
            log::debug!("{} completed successfully", task_name);
            true
        }
        Ok(Err(error)) => {
            log::error!("{} failed: {}", task_name, error);
            false
        }
        Err(join_error) => {
            log::error!("{} panicked or was cancelled: {}", task_name, join_error);
            false
        }
    };

    token.cancel();
    succeeded
}
