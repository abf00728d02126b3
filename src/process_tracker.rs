// Process-wide registry of backend solver subprocesses

use std::process::Child;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

static PROCESSES: LazyLock<Mutex<Vec<Arc<Mutex<Child>>>>> =
    LazyLock::new(|| Mutex::new(Vec::new()));

fn registry() -> MutexGuard<'static, Vec<Arc<Mutex<Child>>>> {
    // a poisoned registry still holds valid handles
    PROCESSES
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Register a spawned child so search termination can reach it; the caller
/// keeps the returned handle to wait on the process.
pub fn track(child: Child) -> Arc<Mutex<Child>> {
    let handle = Arc::new(Mutex::new(child));
    registry().push(handle.clone());
    handle
}

/// Drop a finished child from the registry.
pub fn untrack(handle: &Arc<Mutex<Child>>) {
    registry().retain(|h| !Arc::ptr_eq(h, handle));
}

/// Kill every tracked child and clear the registry. Processes that already
/// exited are skipped silently.
pub fn terminate_all() {
    let drained: Vec<_> = {
        let mut reg = registry();
        reg.drain(..).collect()
    };
    for handle in drained {
        if let Ok(mut child) = handle.lock() {
            let _ = child.kill();
        }
    }
}
