pub mod channel;
pub mod config;
pub mod error;
pub mod notifications;
pub mod notify;
pub mod services;
pub mod settings;
pub mod swipe;

use tracing_subscriber::{fmt, EnvFilter};

pub use channel::{channel_name, Attachment, Composer, ConversationChannelManager, OpenOutcome};
pub use config::ClientConfig;
pub use error::{ClientError, FailureKind, Result};
pub use notifications::NotificationCenter;
pub use notify::{MemoryNotifier, TracingNotifier};
pub use services::Services;
pub use settings::{Clock, DailyCounter, FixedClock, SettingKey, Settings, SystemClock};
pub use swipe::{
    Accepted, DailyProgress, QueueState, QueuedCard, SaveOutcome, SwipeQueueCoordinator,
};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Returns `false` when a subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("talento_client=debug,talento_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok()
}
