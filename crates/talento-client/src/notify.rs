//! User-facing notices and the notification sinks shipped with the client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{error, info};

use talento_shared::service::{NotificationSink, ToastLevel};

/// Localized notice texts.
pub mod texts {
    pub const MESSAGES_LOAD_FAILED: &str = "Impossibile caricare i messaggi";
    pub const MESSAGE_SEND_FAILED: &str = "Invio del messaggio non riuscito, riprova";
    pub const MESSAGE_EMPTY: &str = "Scrivi un messaggio o allega un file";
    pub const ATTACHMENT_UPLOAD_FAILED: &str = "Caricamento dell'allegato non riuscito";
    pub const ATTACHMENT_TOO_LARGE: &str = "L'allegato supera la dimensione massima consentita";
    pub const NEW_MESSAGE_FROM: &str = "Nuovo messaggio da";
    pub const QUEUE_LOAD_FAILED: &str = "Impossibile caricare le proposte";
    pub const FILTER_SCORE_INVALID: &str = "Il punteggio minimo deve essere compreso tra 0 e 100";
    pub const MATCH_CREATED: &str = "È un match!";
    pub const FAVORITE_SAVED: &str = "Candidato aggiunto ai preferiti";
    pub const MATCH_SAVE_FAILED: &str = "Salvataggio del match non riuscito";
    pub const MATCH_ALREADY_EXISTS: &str = "Hai già espresso interesse per questa proposta";
    pub const NOTIFICATIONS_LOAD_FAILED: &str = "Impossibile caricare le notifiche";
    pub const NOTIFICATIONS_UPDATE_FAILED: &str = "Impossibile aggiornare le notifiche";
}

/// Sink for headless hosts: every notice goes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn toast(&self, level: ToastLevel, text: &str) {
        match level {
            ToastLevel::Error => error!(text, "toast"),
            _ => info!(?level, text, "toast"),
        }
    }

    fn platform(&self, title: &str, body: &str) {
        info!(title, body, "platform notification");
    }

    fn host_visible(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformNotice {
    pub title: String,
    pub body: String,
}

/// Sink that keeps every notice in memory, for embedding hosts that render
/// their own notice list and for tests.
#[derive(Debug)]
pub struct MemoryNotifier {
    toasts: Mutex<Vec<Toast>>,
    platform: Mutex<Vec<PlatformNotice>>,
    visible: AtomicBool,
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self {
            toasts: Mutex::new(Vec::new()),
            platform: Mutex::new(Vec::new()),
            visible: AtomicBool::new(true),
        }
    }
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.toasts()
            .into_iter()
            .filter(|t| t.level == ToastLevel::Error)
            .map(|t| t.text)
            .collect()
    }

    pub fn platform_notices(&self) -> Vec<PlatformNotice> {
        self.platform.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut t) = self.toasts.lock() {
            t.clear();
        }
        if let Ok(mut p) = self.platform.lock() {
            p.clear();
        }
    }
}

impl NotificationSink for MemoryNotifier {
    fn toast(&self, level: ToastLevel, text: &str) {
        if let Ok(mut toasts) = self.toasts.lock() {
            toasts.push(Toast {
                level,
                text: text.to_string(),
            });
        }
    }

    fn platform(&self, title: &str, body: &str) {
        if let Ok(mut notices) = self.platform.lock() {
            notices.push(PlatformNotice {
                title: title.to_string(),
                body: body.to_string(),
            });
        }
    }

    fn host_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}
