use std::future::Future;

#[cfg(not(target_arch = "wasm32"))]
/// Spawn a task onto the ambient tokio runtime
pub fn spawn<F>(future: F)
where F: Future<Output = ()> + Send + 'static {
    tokio::spawn(future);
}

#[cfg(target_arch = "wasm32")]
pub fn spawn<F>(future: F)
where F: Future<Output = ()> + Send + 'static {
    wasm_bindgen_futures::spawn_local(future);
}
