mod actions;
mod core;
mod error;
mod logging;
mod scroll;
mod state;
mod store;
mod transport;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use error::ChatError;
pub use scroll::ScrollController;
pub use state::*;
pub use store::{MessageStore, ReplaceOutcome};
pub use transport::{
    HttpMessageTransport, MessageTransport, OfflineTransport, OutgoingAttachment, OutgoingMessage,
    Page, SharedMessageTransport, TransportFuture,
};
pub use updates::*;

/// Return the default `alertchat_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

/// File name the core reads its config from, relative to the data dir.
pub fn config_file_name() -> &'static str {
    core::CONFIG_FILE_NAME
}

#[uniffi::export]
pub fn max_attachment_bytes() -> u64 {
    core::MAX_ATTACHMENT_BYTES
}

#[uniffi::export]
pub fn is_allowed_attachment_type(mime_type: &str) -> bool {
    core::validate_attachment(0, mime_type).is_ok()
}

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    transport_override: SharedMessageTransport,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let transport_override: SharedMessageTransport = Arc::new(RwLock::new(None));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let transport_for_core = transport_override.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                transport_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                let shutdown = matches!(msg, CoreMsg::Shutdown);
                core.handle_message(msg);
                if shutdown {
                    break;
                }
            }
            tracing::info!("app actor stopped");
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            transport_override,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}

impl Drop for FfiApp {
    fn drop(&mut self) {
        let _ = self.core_tx.send(CoreMsg::Shutdown);
    }
}

impl FfiApp {
    /// Route all fetches and sends through `transport` instead of the
    /// configured one. Takes effect for the next group that is opened.
    pub fn set_transport_for_tests(&self, transport: Arc<dyn MessageTransport>) {
        match self.transport_override.write() {
            Ok(mut slot) => {
                *slot = Some(transport);
            }
            Err(poison) => {
                *poison.into_inner() = Some(transport);
            }
        }
    }
}
