use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::thread;

use restbench_core::WORKER_THREAD_PREFIX;

type Hook = Arc<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// While alive, panics on pool worker threads are logged at debug level instead
/// of printed by the default hook. The pool already records each one as a failed
/// attempt. Panics on any other thread go to the previous hook.
pub(crate) struct QuietWorkerPanics {
    previous: Hook,
}

impl QuietWorkerPanics {
    pub(crate) fn install() -> Self {
        let previous: Hook = Arc::from(panic::take_hook());
        let fallback = previous.clone();
        panic::set_hook(Box::new(move |info| {
            if is_worker_thread(thread::current().name()) {
                tracing::debug!(%info, "attempt panicked");
            } else {
                (*fallback)(info);
            }
        }));
        Self { previous }
    }
}

impl Drop for QuietWorkerPanics {
    fn drop(&mut self) {
        // `set_hook` itself panics on a panicking thread.
        if thread::panicking() {
            return;
        }
        let previous = self.previous.clone();
        panic::set_hook(Box::new(move |info| (*previous)(info)));
    }
}

fn is_worker_thread(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.starts_with(WORKER_THREAD_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pool_threads_are_quieted() {
        assert!(is_worker_thread(Some("restbench-worker-0")));
        assert!(is_worker_thread(Some("restbench-worker-12")));
        assert!(!is_worker_thread(Some("restbench-io")));
        assert!(!is_worker_thread(Some("main")));
        assert!(!is_worker_thread(None));
    }

    #[test]
    fn worker_panics_still_unwind_while_quieted() {
        let guard = QuietWorkerPanics::install();
        let joined = thread::Builder::new()
            .name(format!("{WORKER_THREAD_PREFIX}0"))
            .spawn(|| -> u8 { panic!("attempt exploded") })
            .unwrap_or_else(|e| panic!("spawn: {e}"))
            .join();
        drop(guard);

        assert!(joined.is_err());
    }
}
