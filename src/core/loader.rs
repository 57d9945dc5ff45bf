use std::ops::Deref;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{Mutex, MutexGuard, OnceCell, watch};

use crate::core::{
    domain::RuntimeDistribution,
    errors::RuntimeLoadError,
    traits::runtime::{Runtime, RuntimeHost},
};

/// Shared reference to the one loaded runtime.
///
/// The runtime is not reentrant, so every clone shares one run lock.
#[derive(Clone, Debug)]
pub struct RuntimeHandle {
    runtime: Arc<dyn Runtime>,
    serial: Arc<Mutex<()>>,
}

impl RuntimeHandle {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Self {
            runtime,
            serial: Arc::new(Mutex::new(())),
        }
    }

    pub fn ptr_eq(&self, other: &RuntimeHandle) -> bool {
        Arc::ptr_eq(&self.runtime, &other.runtime)
    }

    /// Waits until no other evaluation holds the runtime.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.serial.lock().await
    }
}

impl Deref for RuntimeHandle {
    type Target = dyn Runtime;

    fn deref(&self) -> &Self::Target {
        self.runtime.as_ref()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoaderStatus {
    pub is_loading: bool,
    pub ready: bool,
    pub error: Option<String>,
}

/// Bootstraps the runtime at most once.
///
/// Concurrent `ensure_ready` calls share the single in-flight load. The
/// outcome, success or failure, is cached for the lifetime of the loader, so
/// a failed load is never retried; the user has to start a new session.
#[derive(Debug)]
pub struct RuntimeLoader {
    host: Arc<dyn RuntimeHost>,
    distribution: RuntimeDistribution,
    cell: OnceCell<Result<RuntimeHandle, RuntimeLoadError>>,
    status_tx: watch::Sender<LoaderStatus>,
}

impl RuntimeLoader {
    pub fn new(host: Arc<dyn RuntimeHost>, distribution: RuntimeDistribution) -> Self {
        let (status_tx, _) = watch::channel(LoaderStatus::default());
        Self {
            host,
            distribution,
            cell: OnceCell::new(),
            status_tx,
        }
    }

    pub async fn ensure_ready(&self) -> Result<RuntimeHandle, RuntimeLoadError> {
        self.cell.get_or_init(|| self.load()).await.clone()
    }

    /// The loaded handle, without waiting for an in-flight load.
    pub fn current(&self) -> Option<RuntimeHandle> {
        match self.cell.get() {
            Some(Ok(handle)) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn status(&self) -> watch::Receiver<LoaderStatus> {
        self.status_tx.subscribe()
    }

    pub fn mount(self: &Arc<Self>) -> RuntimeMount {
        let (status_tx, _) = watch::channel(self.status_tx.borrow().clone());
        RuntimeMount {
            loader: self.clone(),
            mounted: Arc::new(AtomicBool::new(true)),
            status_tx: Arc::new(status_tx),
        }
    }

    #[tracing::instrument(skip(self), fields(loader = %self.distribution.loader))]
    async fn load(&self) -> Result<RuntimeHandle, RuntimeLoadError> {
        self.status_tx.send_replace(LoaderStatus {
            is_loading: true,
            ..Default::default()
        });

        let result = self.bootstrap().await;
        match &result {
            Ok(_) => {
                tracing::info!("Runtime ready");
                self.status_tx.send_replace(LoaderStatus {
                    is_loading: false,
                    ready: true,
                    error: None,
                });
            }
            Err(err) => {
                tracing::error!("Failed to load runtime: {}", err);
                self.status_tx.send_replace(LoaderStatus {
                    is_loading: false,
                    ready: false,
                    error: Some(err.to_string()),
                });
            }
        }

        result
    }

    async fn bootstrap(&self) -> Result<RuntimeHandle, RuntimeLoadError> {
        if self.host.entrypoint_present() {
            tracing::debug!("Loader entrypoint already present, skipping injection");
        } else {
            tracing::debug!("Injecting runtime loader");
            self.host.inject_loader(&self.distribution.loader).await?;
        }

        let runtime = self.host.initialize(&self.distribution.index).await?;
        Ok(RuntimeHandle::new(runtime))
    }
}

/// One consumer's view of the loader.
///
/// State writes stop as soon as the consumer unmounts, even if the load it
/// started finishes afterwards.
#[derive(Clone, Debug)]
pub struct RuntimeMount {
    loader: Arc<RuntimeLoader>,
    mounted: Arc<AtomicBool>,
    status_tx: Arc<watch::Sender<LoaderStatus>>,
}

impl RuntimeMount {
    pub async fn ensure_ready(&self) -> Result<RuntimeHandle, RuntimeLoadError> {
        self.write_status(|status| status.is_loading = true);

        let result = self.loader.ensure_ready().await;

        self.write_status(|status| {
            status.is_loading = false;
            status.ready = result.is_ok();
            status.error = result.as_ref().err().map(ToString::to_string);
        });
        result
    }

    pub fn status(&self) -> LoaderStatus {
        self.status_tx.borrow().clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::Release);
    }

    fn write_status(&self, change: impl FnOnce(&mut LoaderStatus)) {
        if !self.is_mounted() {
            tracing::debug!("Consumer unmounted, dropping status update");
            return;
        }
        self.status_tx.send_modify(change);
    }
}
