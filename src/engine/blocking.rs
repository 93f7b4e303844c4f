//! Blocking engine work on Tokio's blocking pool.
//!
//! A `spawn_blocking` task cannot be stopped once started. When the caller
//! gives up on it (the pipeline's engine timeout drops the future), the task
//! keeps running and may create its output files after the pipeline has
//! already released those paths. [`offload`] ties the task to its outputs: if
//! the awaiting future is dropped before the task finishes, the task deletes
//! its outputs itself as soon as it completes.

use crate::error::EngineError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Marks the work abandoned when dropped before completion.
struct Abandon(Arc<AtomicBool>);

impl Drop for Abandon {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Run `work` on the blocking pool. `outputs` are the paths `work` may
/// create; they are deleted when `work` finishes after its caller stopped
/// waiting.
pub async fn offload<T, F>(outputs: Vec<PathBuf>, work: F) -> Result<T, EngineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
{
    let abandoned = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&abandoned);
    let _abandon = Abandon(abandoned);

    tokio::task::spawn_blocking(move || {
        let result = work();
        // Every write of `work` happened before this check. If the caller is
        // still waiting it releases the outputs; otherwise nobody will.
        if flag.load(Ordering::SeqCst) {
            for path in &outputs {
                if std::fs::remove_file(path).is_ok() {
                    debug!("Removed abandoned output {}", path.display());
                }
            }
        }
        result
    })
    .await
    .map_err(|e| EngineError::Internal(format!("blocking task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn completed_work_keeps_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("a.txt");
        let target = out.clone();
        offload(vec![out.clone()], move || {
            std::fs::write(&target, b"done")?;
            Ok(())
        })
        .await
        .unwrap();
        assert!(out.exists());
    }

    #[tokio::test]
    async fn abandoned_work_removes_late_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("late.jpg");
        let target = out.clone();
        let call = offload(vec![out.clone()], move || {
            std::thread::sleep(Duration::from_millis(300));
            std::fs::write(&target, b"jpeg")?;
            Ok(())
        });

        let timed_out = tokio::time::timeout(Duration::from_millis(50), call).await;
        assert!(timed_out.is_err());
        assert!(!out.exists());

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(!out.exists(), "late output must be removed");
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let err = offload::<(), _>(Vec::new(), || Err(EngineError::NoText)).await.unwrap_err();
        assert!(matches!(err, EngineError::NoText));
    }
}
