use std::future::Future;

use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("framebus-worker")
            .enable_all()
            .build()
            .expect("failed to build background runtime")
    })
}

/// Spawn a future on the shared background runtime.
///
/// The frame loop is synchronous and must never block, so everything
/// that waits on the network runs here instead.
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    runtime().spawn(future);
}
