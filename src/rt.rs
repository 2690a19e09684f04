//! Runtime helpers shared by native (tokio) and WASM builds

use std::future::Future;
use tracing::Instrument;

pub use std::time::Duration;

/// Run `task` in the background under a `task` tracing span.
///
/// Native builds hand it to `tokio::spawn`; WASM builds use
/// `wasm_bindgen_futures::spawn_local`, where `Send` is not required
/// but still demanded here so both targets share one signature.
pub fn spawn<F>(name: &'static str, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let task = task.instrument(tracing::debug_span!("task", name));

    #[cfg(not(target_arch = "wasm32"))]
    tokio::spawn(task);

    #[cfg(target_arch = "wasm32")]
    wasm_bindgen_futures::spawn_local(task);
}

/// Wait for `duration` on the platform timer.
pub async fn sleep(duration: Duration) {
    #[cfg(not(target_arch = "wasm32"))]
    tokio::time::sleep(duration).await;

    #[cfg(target_arch = "wasm32")]
    gloo_timers::future::sleep(duration).await;
}
