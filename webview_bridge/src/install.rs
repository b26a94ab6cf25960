use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use tokio::{runtime::Handle, sync::OnceCell};

use crate::{
    actor::{BridgeConfig, BridgeHandle, connect},
    transport::{TransportSink, TransportSource},
};

// -------------------------------------------------------------------------------------------------------

pub type ReadyCallback = Box<dyn FnOnce(BridgeHandle) + Send + 'static>;

enum StartupQueue {
    /// callbacks waiting for the bridge to be installed, in registration order
    Waiting(Vec<ReadyCallback>),
    /// the runtime the bridge was installed on, late callbacks are spawned there
    Drained(Handle),
}

/// Holds at most one installed bridge.
///
/// The first [`BridgeSlot::install`] connects the bridge; every later one returns the same
/// handle and drops the transport it was given. Code that runs before installation can queue
/// itself with [`BridgeSlot::on_bridge_ready`].
pub struct BridgeSlot {
    instance: OnceCell<BridgeHandle>,
    startup_queue: Mutex<StartupQueue>,
}

impl Default for BridgeSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeSlot {
    pub const fn new() -> Self {
        BridgeSlot {
            instance: OnceCell::const_new(),
            startup_queue: Mutex::new(StartupQueue::Waiting(Vec::new())),
        }
    }

    pub async fn install(
        &self,
        sink: TransportSink,
        source: TransportSource,
        config: BridgeConfig,
    ) -> anyhow::Result<BridgeHandle> {
        let mut installed_now = false;
        let handle = self
            .instance
            .get_or_try_init(|| {
                installed_now = true;
                connect(sink, source, config)
            })
            .await?
            .clone();

        if installed_now {
            self.drain_startup_queue(&handle, Handle::current());
        } else {
            debug!(
                "Bridge {} is already installed, ignoring the new transport",
                handle.actor().get_id()
            );
        }

        Ok(handle)
    }

    pub fn get(&self) -> Option<BridgeHandle> {
        self.instance.get().cloned()
    }

    pub fn is_installed(&self) -> bool {
        self.instance.initialized()
    }

    /// Runs `callback` with the installed bridge.
    ///
    /// Before installation the callback is queued; the queue is drained on a spawned task once
    /// the bridge is up. Afterwards the callback is spawned right away on the runtime that
    /// installed the bridge, so any thread may call this. Either way it never runs inline.
    pub fn on_bridge_ready<F>(&self, callback: F)
    where
        F: FnOnce(BridgeHandle) + Send + 'static,
    {
        let runtime = match &mut *self.lock_queue() {
            StartupQueue::Waiting(callbacks) => {
                callbacks.push(Box::new(callback));
                return;
            }
            StartupQueue::Drained(runtime) => runtime.clone(),
        };

        // drained implies installed
        if let Some(handle) = self.get() {
            runtime.spawn(async move { callback(handle) });
        }
    }

    /// number of callbacks still waiting, `None` once the queue has been drained
    pub fn queued_callbacks(&self) -> Option<usize> {
        match &*self.lock_queue() {
            StartupQueue::Waiting(callbacks) => Some(callbacks.len()),
            StartupQueue::Drained(_) => None,
        }
    }

    fn drain_startup_queue(&self, handle: &BridgeHandle, runtime: Handle) {
        let drained = StartupQueue::Drained(runtime.clone());
        let callbacks = match std::mem::replace(&mut *self.lock_queue(), drained) {
            StartupQueue::Waiting(callbacks) => callbacks,
            StartupQueue::Drained(_) => Vec::new(),
        };

        if callbacks.is_empty() {
            return;
        }

        info!("Running {} queued bridge callbacks", callbacks.len());
        let handle = handle.clone();
        runtime.spawn(async move {
            for callback in callbacks {
                callback(handle.clone());
            }
        });
    }

    fn lock_queue(&self) -> MutexGuard<'_, StartupQueue> {
        self.startup_queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// -------------------------------------------------------------------------------------------------------

static GLOBAL_BRIDGE: BridgeSlot = BridgeSlot::new();

/// Installs the process-wide bridge. Repeated calls return the bridge installed first.
pub async fn install(
    sink: TransportSink,
    source: TransportSource,
    config: BridgeConfig,
) -> anyhow::Result<BridgeHandle> {
    GLOBAL_BRIDGE.install(sink, source, config).await
}

/// See [`BridgeSlot::on_bridge_ready`].
pub fn on_bridge_ready<F>(callback: F)
where
    F: FnOnce(BridgeHandle) + Send + 'static,
{
    GLOBAL_BRIDGE.on_bridge_ready(callback)
}

pub fn installed() -> Option<BridgeHandle> {
    GLOBAL_BRIDGE.get()
}
