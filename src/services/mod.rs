/// Long-running service framework
///
/// Services spawn their worker tasks against a shared shutdown signal and
/// hand the join handles back to the manager, which stops everything in
/// reverse startup order and waits (bounded) for the tasks to drain. The
/// signal is a `watch` channel, so it holds state: a task that subscribes
/// after the stop was issued still observes it.
pub mod indexing_service;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::logger::{self, LogTag};

/// Cloneable handle on the manager's stop signal. One clone per worker task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is signalled. Resolves immediately when the
    /// signal was already issued, so a late subscriber cannot miss it.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

#[async_trait]
pub trait Service: Send + Sync {
    /// Unique service identifier
    fn name(&self) -> &'static str;

    /// Lower starts earlier, stops later
    fn priority(&self) -> i32 {
        100
    }

    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    /// Spawn the service's tasks. Each task must exit promptly once
    /// `shutdown` is signalled, including from the middle of a work cycle.
    async fn start(&mut self, shutdown: ShutdownSignal) -> Result<Vec<JoinHandle<()>>>;

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct ServiceManager {
    services: Vec<Box<dyn Service>>,
    handles: HashMap<&'static str, Vec<JoinHandle<()>>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ServiceManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            services: Vec::new(),
            handles: HashMap::new(),
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    pub fn register(&mut self, service: Box<dyn Service>) {
        self.services.push(service);
    }

    /// Start all registered services in priority order.
    pub async fn start_all(&mut self) -> Result<()> {
        logger::info(LogTag::Service, "starting services");

        self.services.sort_by_key(|service| service.priority());

        for service in &mut self.services {
            let name = service.name();
            service.initialize().await?;
            let handles = service
                .start(ShutdownSignal::new(self.shutdown_tx.subscribe()))
                .await?;
            self.handles.insert(name, handles);
            logger::info(LogTag::Service, &format!("started {name}"));
        }

        Ok(())
    }

    /// Signal shutdown and stop services in reverse startup order. Tasks
    /// that do not drain within the timeout are aborted.
    pub async fn stop_all(&mut self) {
        logger::info(LogTag::Service, "stopping services");
        let _ = self.shutdown_tx.send(true);

        for service in self.services.iter_mut().rev() {
            let name = service.name();
            if let Err(e) = service.stop().await {
                logger::warning(LogTag::Service, &format!("stop error for {name}: {e}"));
            }

            if let Some(handles) = self.handles.remove(name) {
                for mut handle in handles {
                    let drained =
                        tokio::time::timeout(std::time::Duration::from_secs(5), &mut handle).await;
                    if drained.is_err() {
                        logger::warning(
                            LogTag::Service,
                            &format!("task for {name} did not stop in time, aborting"),
                        );
                        handle.abort();
                    }
                }
            }
            logger::info(LogTag::Service, &format!("stopped {name}"));
        }
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct RecordingService {
        started: Arc<AtomicBool>,
        finished: Arc<AtomicBool>,
        startup_delay: Duration,
    }

    #[async_trait]
    impl Service for RecordingService {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn start(&mut self, shutdown: ShutdownSignal) -> Result<Vec<JoinHandle<()>>> {
            self.started.store(true, Ordering::SeqCst);
            let finished = self.finished.clone();
            let delay = self.startup_delay;
            let mut shutdown = shutdown;
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                shutdown.cancelled().await;
                finished.store(true, Ordering::SeqCst);
            });
            Ok(vec![handle])
        }
    }

    #[tokio::test]
    async fn manager_starts_and_drains_tasks() {
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let mut manager = ServiceManager::new();
        manager.register(Box::new(RecordingService {
            started: started.clone(),
            finished: finished.clone(),
            startup_delay: Duration::ZERO,
        }));

        manager.start_all().await.unwrap();
        assert!(started.load(Ordering::SeqCst));
        assert!(!finished.load(Ordering::SeqCst));

        manager.stop_all().await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stop_signal_reaches_tasks_not_yet_waiting() {
        // The task only starts waiting for the signal well after stop_all
        // has already issued it; the stateful signal must still be seen.
        let finished = Arc::new(AtomicBool::new(false));

        let mut manager = ServiceManager::new();
        manager.register(Box::new(RecordingService {
            started: Arc::new(AtomicBool::new(false)),
            finished: finished.clone(),
            startup_delay: Duration::from_millis(100),
        }));

        manager.start_all().await.unwrap();
        manager.stop_all().await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn signal_already_issued_resolves_immediately() {
        let (tx, rx) = watch::channel(false);
        let mut signal = ShutdownSignal::new(rx);
        assert!(!signal.is_cancelled());

        tx.send(true).unwrap();
        assert!(signal.is_cancelled());
        // Does not hang despite the send happening before the await
        signal.cancelled().await;
    }
}
