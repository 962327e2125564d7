//! Session lifecycle: shared state, the event-driven state machine, and
//! the reconnect supervisor.

pub mod reducer;
pub mod state;
pub mod supervisor;

pub use reducer::{transition, Effect, EventReducer, SessionInput};
pub use state::{LoginArtifact, Phase, SessionState, SessionStore};
pub use supervisor::{ReconnectHandle, ReconnectReason, ReconnectStats, ReconnectSupervisor};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::transport::{EventReceiver, Transport};
use crate::ui::qr::ArtifactRenderer;

/// Running session core: the store plus its two background tasks.
pub struct SessionRuntime {
    pub store: SessionStore,
    pub reconnect: ReconnectHandle,
    reducer: JoinHandle<()>,
    supervisor: JoinHandle<()>,
}

impl SessionRuntime {
    /// Spawn the event reducer and reconnect supervisor.
    ///
    /// Nothing is initialized yet; call `reconnect.request(ReconnectReason::Startup)`
    /// to start the transport.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        events: EventReceiver,
        renderer: Arc<dyn ArtifactRenderer>,
        print_qr: bool,
        cancel: CancellationToken,
    ) -> Self {
        let store = SessionStore::new();
        let (supervisor, reconnect) = ReconnectSupervisor::new(transport);
        let reducer = EventReducer::new(store.clone(), renderer, reconnect.clone(), print_qr);

        Self {
            store,
            reconnect,
            reducer: reducer.spawn(events, cancel.clone()),
            supervisor: supervisor.spawn(cancel),
        }
    }

    /// Wait for both tasks to stop (after the cancel token fires).
    pub async fn join(self) {
        if let Err(e) = self.reducer.await {
            tracing::error!("Event reducer task failed: {}", e);
        }
        if let Err(e) = self.supervisor.await {
            tracing::error!("Reconnect supervisor task failed: {}", e);
        }
    }
}
