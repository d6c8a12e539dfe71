//! `watchFile` / `unwatchFile`: change detection by polling `stat`.
//!
//! Nothing here crosses the RPC channel except the `stat` calls themselves.
//! One poller runs per watched path; every listener added for that path
//! shares it.

use dashmap::DashMap;
use fsremote_types::{Stats, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::fs::Core;

/// `listener(current, previous)`.
pub type StatListener = Arc<dyn Fn(&Stats, &Stats) + Send + Sync>;

struct Poller {
    listeners: Arc<Mutex<Vec<StatListener>>>,
    task: JoinHandle<()>,
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Active pollers keyed by path.
#[derive(Default)]
pub(crate) struct StatPollers {
    pollers: DashMap<String, Poller>,
}

impl StatPollers {
    pub(crate) fn len(&self) -> usize {
        self.pollers.len()
    }

    pub(crate) fn add(
        &self,
        runtime: &Handle,
        core: Arc<Core>,
        path: Value,
        interval: Duration,
        listener: StatListener,
    ) {
        let key = path_key(&path);
        if let Some(poller) = self.pollers.get(&key) {
            poller.listeners.lock().push(listener);
            return;
        }
        let listeners = Arc::new(Mutex::new(vec![listener]));
        tracing::debug!(path = %key, ?interval, "polling file");
        let task = runtime.spawn(poll(core, path, interval, Arc::clone(&listeners)));
        self.pollers.insert(key, Poller { listeners, task });
    }

    pub(crate) fn remove(&self, path: &Value) {
        if self.pollers.remove(&path_key(path)).is_some() {
            tracing::debug!(path = %path_key(path), "stopped polling file");
        }
    }
}

fn path_key(path: &Value) -> String {
    match path {
        Value::String(s) => s.clone(),
        Value::Url(url) => url.to_file_path().map_or_else(|_| url.to_string(), |p| p.display().to_string()),
        other => match other.as_bytes() {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => other.to_string(),
        },
    }
}

/// A path that cannot be stat'ed reads as all zeroes.
async fn current(core: &Core, path: &Value) -> Stats {
    match core.call("stat", std::slice::from_ref(path)).await {
        Ok(value) => Stats::from_value(&value).unwrap_or_default(),
        Err(e) => {
            tracing::trace!(error = %e, "stat failed while polling");
            Stats::default()
        }
    }
}

/// Whether the fields a watcher cares about differ.
pub fn changed(current: &Stats, previous: &Stats) -> bool {
    current.mtime_ms != previous.mtime_ms
        || current.size != previous.size
        || current.mode != previous.mode
        || current.ino != previous.ino
}

async fn poll(core: Arc<Core>, path: Value, interval: Duration, listeners: Arc<Mutex<Vec<StatListener>>>) {
    let mut previous = current(&core, &path).await;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let stats = current(&core, &path).await;
        if changed(&stats, &previous) {
            let snapshot: Vec<StatListener> = listeners.lock().clone();
            for listener in snapshot {
                listener(&stats, &previous);
            }
        }
        previous = stats;
    }
}
