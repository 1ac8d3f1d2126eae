//! The delivery context: a single logical thread on which throttle
//! deliveries, timer callbacks and host-facing callbacks run.

use std::future::Future;
use std::io;
use std::thread;

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Cheap, cloneable handle to the delivery context.
///
/// Any thread may schedule work through a `Dispatcher`; the work itself only
/// ever runs on the runtime the handle belongs to. When that runtime is the
/// current-thread runtime started by [`Dispatcher::spawn_ui_thread`] (or a
/// `#[tokio::test]` runtime) every scheduled item runs on one thread, so
/// callbacks never race with each other.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    handle: Handle,
}

impl Dispatcher {
    /// Wraps the runtime the caller is currently running on.
    ///
    /// Panics outside a Tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Runs `f` once on the delivery context. Never blocks the caller.
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.handle.spawn(async move { f() });
    }

    /// Starts a dedicated OS thread driving a current-thread runtime and
    /// returns a dispatcher bound to it.
    pub fn spawn_ui_thread(name: &str) -> io::Result<(Dispatcher, UiThread)> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread_name = name.to_string();
        let join = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                trace!(target = "dispatch", thread = %thread_name, "ui thread started");
                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
                trace!(target = "dispatch", thread = %thread_name, "ui thread stopping");
            })?;
        debug!(target = "dispatch", thread = name, "delivery context ready");
        Ok((
            Dispatcher { handle },
            UiThread {
                shutdown: Some(shutdown_tx),
                join: Some(join),
            },
        ))
    }
}

/// Owner of the thread started by [`Dispatcher::spawn_ui_thread`].
///
/// Dropping it shuts the runtime down; tasks still pending at that point are
/// cancelled.
pub struct UiThread {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl UiThread {
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if join.thread().id() == thread::current().id() {
                return;
            }
            if join.join().is_err() {
                warn!(target = "dispatch", "ui thread panicked during shutdown");
            }
        }
    }
}

impl Drop for UiThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn ui_thread_runs_posted_work_on_one_thread() {
        let (dispatcher, ui) = Dispatcher::spawn_ui_thread("termctl-test-ui").expect("ui thread");
        let (tx, rx) = mpsc::channel();
        for idx in 0..4 {
            let tx = tx.clone();
            dispatcher.post(move || {
                let _ = tx.send((idx, thread::current().name().map(str::to_owned)));
            });
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rx.recv_timeout(Duration::from_secs(5)).expect("posted work"));
        }
        assert!(
            seen.iter()
                .all(|(_, name)| name.as_deref() == Some("termctl-test-ui")),
            "all work should run on the ui thread: {seen:?}"
        );
        ui.shutdown();
    }

    #[tokio::test]
    async fn current_dispatcher_spawns_on_test_runtime() {
        let dispatcher = Dispatcher::current();
        let value = dispatcher.spawn(async { 41 + 1 }).await.expect("join");
        assert_eq!(value, 42);
    }
}
