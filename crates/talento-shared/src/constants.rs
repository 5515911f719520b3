/// Application name
pub const APP_NAME: &str = "Talento";

/// Prefix of every conversation channel name
pub const CHANNEL_PREFIX: &str = "chat";

/// Separator placed between sorted participant ids in a channel name
pub const CHANNEL_SEPARATOR: &str = "__";

/// Resource holding chat messages
pub const RESOURCE_MESSAGES: &str = "messages";

/// Resource holding published job offers
pub const RESOURCE_JOB_OFFERS: &str = "job_offers";

/// Resource holding candidate profiles
pub const RESOURCE_CANDIDATES: &str = "candidate_profiles";

/// Candidate -> job offer matches
pub const RESOURCE_MATCHES: &str = "matches";

/// Recruiter -> candidate favorites
pub const RESOURCE_FAVORITES: &str = "favorites";

/// In-app notification center records
pub const RESOURCE_NOTIFICATIONS: &str = "notifications";

/// Default blob bucket for chat attachments
pub const DEFAULT_MEDIA_BUCKET: &str = "chat-media";

/// Upper bound of cards fetched by a single swipe queue load
pub const SWIPE_BATCH_LIMIT: usize = 20;

/// Notification center page size
pub const NOTIFICATION_PAGE_SIZE: usize = 50;

/// Highest TRS value a filter may ask for
pub const MAX_TRS_SCORE: u32 = 100;

/// Error code the persistence layer reports for a unique constraint violation
pub const CONFLICT_CODE: &str = "23505";

/// Maximum attachment size in bytes (20 MiB)
pub const MAX_ATTACHMENT_SIZE: usize = 20 * 1024 * 1024;
