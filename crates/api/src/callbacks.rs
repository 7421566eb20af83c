//! Extension callbacks around the server lifecycle.
//!
//! A failing callback is logged and skipped; it never stops the server.

use std::sync::Arc;

use crate::timer::StartupTimer;

pub type CallbackResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Lifecycle points an extension can hook. All methods default to no-ops.
pub trait LifecycleCallbacks: Send + Sync {
    fn name(&self) -> &str;

    /// Before the router is built.
    fn before_ui(&self) -> CallbackResult {
        Ok(())
    }

    /// After the server is bound. `url` is the local address.
    fn app_started(&self, _url: &str) -> CallbackResult {
        Ok(())
    }

    /// The server is restarting.
    fn app_reload(&self) -> CallbackResult {
        Ok(())
    }

    /// Extension state is being discarded ahead of a restart.
    fn script_unloaded(&self) -> CallbackResult {
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct CallbackRegistry {
    callbacks: Vec<Arc<dyn LifecycleCallbacks>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callbacks: Arc<dyn LifecycleCallbacks>) {
        self.callbacks.push(callbacks);
    }

    pub fn before_ui(&self, timer: &StartupTimer) {
        self.each("before_ui", timer, |cb| cb.before_ui());
    }

    pub fn app_started(&self, url: &str, timer: &StartupTimer) {
        self.each("app_started", timer, |cb| cb.app_started(url));
    }

    pub fn app_reload(&self, timer: &StartupTimer) {
        self.each("app_reload", timer, |cb| cb.app_reload());
    }

    pub fn script_unloaded(&self, timer: &StartupTimer) {
        self.each("script_unloaded", timer, |cb| cb.script_unloaded());
    }

    fn each(
        &self,
        point: &str,
        timer: &StartupTimer,
        call: impl Fn(&dyn LifecycleCallbacks) -> CallbackResult,
    ) {
        for cb in &self.callbacks {
            if let Err(e) = call(cb.as_ref()) {
                tracing::error!(callback = cb.name(), point, error = %e, "Lifecycle callback failed");
            }
            timer.subcategory(point, cb.name());
        }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.callbacks.iter().map(|cb| cb.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl LifecycleCallbacks for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn before_ui(&self) -> CallbackResult {
            self.calls.lock().unwrap().push("before_ui".into());
            Err("boom".into())
        }

        fn app_started(&self, url: &str) -> CallbackResult {
            self.calls.lock().unwrap().push(format!("app_started {url}"));
            Ok(())
        }
    }

    #[test]
    fn failing_callback_does_not_stop_the_rest() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let mut registry = CallbackRegistry::new();
        registry.register(first.clone());
        registry.register(second.clone());

        let timer = StartupTimer::new();
        registry.before_ui(&timer);
        registry.app_started("http://127.0.0.1:7860", &timer);

        assert_eq!(
            *second.calls.lock().unwrap(),
            vec!["before_ui", "app_started http://127.0.0.1:7860"]
        );
        assert!(timer.dump().records.contains_key("before_ui/recorder"));
    }
}
