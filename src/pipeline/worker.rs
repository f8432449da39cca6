use super::LifecycleController;
use crate::project::ProjectId;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct RunSlot {
    handle: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

impl RunSlot {
    fn in_flight(&self) -> bool {
        !self.handle.is_finished() && !*self.done.borrow()
    }
}

/// Background runner with at most one in-flight run per project.
pub struct ProcessingQueue {
    controller: LifecycleController,
    runs: Mutex<HashMap<ProjectId, RunSlot>>,
}

impl ProcessingQueue {
    pub fn new(controller: LifecycleController) -> Self {
        Self {
            controller,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Start processing `project_id` in the background.
    ///
    /// Returns `false` when a run for the same project is still in flight;
    /// the second request is dropped. Must be called within a tokio runtime.
    pub fn start_processing(&self, project_id: ProjectId) -> bool {
        let mut runs = self.runs.lock().unwrap_or_else(|p| p.into_inner());
        runs.retain(|_, slot| slot.in_flight());
        if runs.contains_key(&project_id) {
            tracing::info!(%project_id, "processing already running, request ignored");
            return false;
        }

        let (done_tx, done_rx) = watch::channel(false);
        let controller = self.controller.clone();
        let handle = tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(controller.run(project_id))
                .catch_unwind()
                .await
            {
                let detail = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic payload".to_string()
                };
                tracing::error!(%project_id, "processing crashed: {}", detail);
                controller.mark_failed(
                    project_id,
                    format!("Processing crashed unexpectedly: {}", detail),
                );
            }
            let _ = done_tx.send(true);
        });

        runs.insert(
            project_id,
            RunSlot {
                handle,
                done: done_rx,
            },
        );
        tracing::debug!(%project_id, "processing scheduled");
        true
    }

    pub fn is_running(&self, project_id: ProjectId) -> bool {
        self.runs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&project_id)
            .is_some_and(RunSlot::in_flight)
    }

    #[cfg(test)]
    pub(crate) fn tracked_runs(&self) -> usize {
        self.runs.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Wait for the latest run of `project_id`, if any, to finish.
    pub async fn wait(&self, project_id: ProjectId) {
        let done = self
            .runs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&project_id)
            .map(|slot| slot.done.clone());
        if let Some(mut done) = done {
            // A dropped sender means the task is gone either way.
            let _ = done.wait_for(|finished| *finished).await;
        }
    }
}
