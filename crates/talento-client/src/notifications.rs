//! Notification center of the current participant.

use serde_json::json;
use tracing::{debug, warn};

use talento_shared::constants::{NOTIFICATION_PAGE_SIZE, RESOURCE_NOTIFICATIONS};
use talento_shared::models::{from_record, Notification};
use talento_shared::service::ToastLevel;
use talento_shared::{OrderBy, ParticipantId, Predicate, Query, ServiceError};

use crate::error::{ClientError, Result};
use crate::notify::texts;
use crate::services::Services;

pub struct NotificationCenter {
    services: Services,
    user: ParticipantId,
    page_size: usize,
}

impl NotificationCenter {
    pub fn new(services: Services, user: ParticipantId) -> Self {
        Self {
            services,
            user,
            page_size: NOTIFICATION_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn report(&self, error: ServiceError, text: &str) -> ClientError {
        warn!(user = %self.user, error = %error, "Notification request failed");
        self.services.notifier.toast(ToastLevel::Error, text);
        error.into()
    }

    fn mine(&self) -> Predicate {
        Predicate::eq("user_id", self.user.as_str())
    }

    /// Most recent notifications, newest first.
    pub async fn list(&self) -> Result<Vec<Notification>> {
        let query = Query::new(RESOURCE_NOTIFICATIONS)
            .filter(self.mine())
            .order_by(OrderBy::desc("created_at"))
            .order_by(OrderBy::desc("id"))
            .limit(self.page_size);

        let records = self
            .services
            .records
            .query(query)
            .await
            .map_err(|e| self.report(e, texts::NOTIFICATIONS_LOAD_FAILED))?;

        Ok(records
            .into_iter()
            .filter_map(|record| match from_record::<Notification>(record) {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed notification");
                    None
                }
            })
            .collect())
    }

    pub async fn unread_count(&self) -> Result<usize> {
        let query = Query::new(RESOURCE_NOTIFICATIONS)
            .filter(self.mine())
            .filter(Predicate::eq("read", false));
        let records = self
            .services
            .records
            .query(query)
            .await
            .map_err(|e| self.report(e, texts::NOTIFICATIONS_LOAD_FAILED))?;
        Ok(records.len())
    }

    /// Mark one notification as read. Returns whether anything changed.
    pub async fn mark_read(&self, id: &str) -> Result<bool> {
        let predicate = Predicate::And(vec![
            Predicate::eq("id", id),
            self.mine(),
            Predicate::eq("read", false),
        ]);
        let updated = self
            .services
            .records
            .update(RESOURCE_NOTIFICATIONS, predicate, json!({ "read": true }))
            .await
            .map_err(|e| self.report(e, texts::NOTIFICATIONS_UPDATE_FAILED))?;
        Ok(!updated.is_empty())
    }

    pub async fn mark_all_read(&self) -> Result<usize> {
        let predicate = Predicate::And(vec![self.mine(), Predicate::eq("read", false)]);
        let updated = self
            .services
            .records
            .update(RESOURCE_NOTIFICATIONS, predicate, json!({ "read": true }))
            .await
            .map_err(|e| self.report(e, texts::NOTIFICATIONS_UPDATE_FAILED))?;
        debug!(user = %self.user, count = updated.len(), "Notifications marked read");
        Ok(updated.len())
    }
}
