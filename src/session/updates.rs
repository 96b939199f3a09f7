// Periodic UI update tasks
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to at most one in-flight periodic task
#[derive(Debug, Default)]
pub(crate) struct UpdateTask {
    handle: Option<JoinHandle<()>>,
}

impl UpdateTask {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn `task` unless one is already running. Returns whether it spawned.
    pub fn start<F>(&mut self, runtime: &Handle, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            return false;
        }
        self.handle = Some(runtime.spawn(task));
        true
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Call `tick` every `interval` until it returns false
pub(crate) async fn run_periodic<F>(interval: Duration, mut tick: F)
where
    F: FnMut() -> bool + Send,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !tick() {
            break;
        }
    }
}
