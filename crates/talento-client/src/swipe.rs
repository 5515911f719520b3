//! Swipe queue coordinator.
//!
//! Presents a bounded batch of cards of the opposite role, one at a time.
//! Accepting a card records a match (candidate) or a favorite (recruiter);
//! both gestures count towards the daily swipe counter.

use std::collections::{HashSet, VecDeque};

use serde_json::Value;
use tracing::{debug, info, warn};

use talento_shared::constants::{
    MAX_TRS_SCORE, RESOURCE_CANDIDATES, RESOURCE_FAVORITES, RESOURCE_JOB_OFFERS, RESOURCE_MATCHES,
};
use talento_shared::models::{
    from_record, to_record, CandidateCard, FavoriteRecord, JobOfferCard, MatchRecord,
    SwipeCard, SwipeFilters,
};
use talento_shared::scoring::culture_fit;
use talento_shared::service::ToastLevel;
use talento_shared::{Actor, CardId, ParticipantId, Predicate, Query, Record, Role, ServiceError};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::notify::texts;
use crate::services::Services;
use crate::settings::DailyCounter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Loading,
    Presenting,
    Exhausted,
}

/// A card in the queue with its culture fit against the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCard {
    pub card: SwipeCard,
    pub culture_fit: Option<u8>,
}

/// What happened to the match or favorite behind a right swipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The pair existed already.
    AlreadySaved,
    /// The backend could not be reached or refused the record.
    Failed,
}

/// A right swipe: the card that left the queue and how saving it went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub card: QueuedCard,
    pub saved: SaveOutcome,
}

/// Swipes done today against the configured goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyProgress {
    pub count: u32,
    pub goal: u32,
}

impl DailyProgress {
    /// Completed share of the goal, capped at 1.0.
    pub fn ratio(&self) -> f32 {
        if self.goal == 0 {
            return 1.0;
        }
        (self.count as f32 / self.goal as f32).min(1.0)
    }
}

/// Collections and fields a role swipes through.
#[derive(Debug, Clone, Copy)]
struct RolePlan {
    role: Role,
    /// Collection the cards come from.
    source: &'static str,
    /// Collection a right swipe writes to.
    interactions: &'static str,
    actor_field: &'static str,
    target_field: &'static str,
}

impl RolePlan {
    fn for_role(role: Role) -> Self {
        match role {
            Role::Candidate => Self {
                role,
                source: RESOURCE_JOB_OFFERS,
                interactions: RESOURCE_MATCHES,
                actor_field: "candidate_id",
                target_field: "job_offer_id",
            },
            Role::Recruiter => Self {
                role,
                source: RESOURCE_CANDIDATES,
                interactions: RESOURCE_FAVORITES,
                actor_field: "recruiter_id",
                target_field: "candidate_id",
            },
        }
    }

    fn filter_predicates(&self, filters: &SwipeFilters) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(city) = &filters.city {
            predicates.push(Predicate::eq("location", city.as_str()));
        }
        match self.role {
            Role::Candidate => {
                if let Some(sector) = &filters.sector {
                    predicates.push(Predicate::eq("sector", sector.as_str()));
                }
                if filters.min_score.is_some() {
                    debug!("Minimum score does not apply to job offers");
                }
            }
            Role::Recruiter => {
                if let Some(sector) = &filters.sector {
                    predicates.push(Predicate::contains("skills", sector.as_str()));
                }
                if let Some(score) = filters.min_score {
                    predicates.push(Predicate::gte("trs_score", score));
                }
            }
        }
        predicates
    }

    fn parse_card(&self, record: Record) -> std::result::Result<SwipeCard, ServiceError> {
        Ok(match self.role {
            Role::Candidate => SwipeCard::JobOffer(from_record::<JobOfferCard>(record)?),
            Role::Recruiter => SwipeCard::Candidate(from_record::<CandidateCard>(record)?),
        })
    }

    fn interaction(
        &self,
        actor: &ParticipantId,
        card: &CardId,
    ) -> std::result::Result<Record, ServiceError> {
        match self.role {
            Role::Candidate => to_record(&MatchRecord {
                candidate_id: actor.clone(),
                job_offer_id: card.clone(),
            }),
            Role::Recruiter => to_record(&FavoriteRecord {
                recruiter_id: actor.clone(),
                candidate_id: card.clone(),
            }),
        }
    }

    fn saved_text(&self) -> &'static str {
        match self.role {
            Role::Candidate => texts::MATCH_CREATED,
            Role::Recruiter => texts::FAVORITE_SAVED,
        }
    }
}

pub struct SwipeQueueCoordinator {
    services: Services,
    actor: Actor,
    actor_values: Vec<String>,
    plan: RolePlan,
    counter: DailyCounter,
    batch: usize,
    daily_goal: u32,
    queue: VecDeque<QueuedCard>,
    state: QueueState,
    filters: SwipeFilters,
}

impl SwipeQueueCoordinator {
    /// `actor_values` are the actor's declared core values, used for the
    /// culture fit of every card.
    pub fn new(
        services: Services,
        actor: Actor,
        actor_values: Vec<String>,
        config: &ClientConfig,
    ) -> Self {
        let counter = DailyCounter::new(services.typed_settings(), services.clock.clone());
        Self {
            plan: RolePlan::for_role(actor.role()),
            services,
            actor,
            actor_values,
            counter,
            batch: config.swipe_batch,
            daily_goal: config.daily_goal,
            queue: VecDeque::new(),
            state: QueueState::Loading,
            filters: SwipeFilters::default(),
        }
    }

    pub fn state(&self) -> QueueState {
        self.state
    }

    pub fn current(&self) -> Option<&QueuedCard> {
        self.queue.front()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    pub fn filters(&self) -> &SwipeFilters {
        &self.filters
    }

    /// Replace the queue with a fresh batch matching `filters`. Returns the
    /// number of cards loaded.
    ///
    /// Invalid filters are rejected before anything changes; the current
    /// queue stays as it was.
    pub async fn load(&mut self, filters: SwipeFilters) -> Result<usize> {
        let filters = filters.normalized();
        if let Some(score) = filters.min_score {
            if score > MAX_TRS_SCORE {
                self.services
                    .notifier
                    .toast(ToastLevel::Error, texts::FILTER_SCORE_INVALID);
                return Err(ClientError::Validation(format!(
                    "minimum score {score} exceeds {MAX_TRS_SCORE}"
                )));
            }
        }

        self.state = QueueState::Loading;
        self.queue.clear();

        match self.fetch(&filters).await {
            Ok(cards) => {
                self.queue = cards;
                self.state = if self.queue.is_empty() {
                    QueueState::Exhausted
                } else {
                    QueueState::Presenting
                };
                info!(
                    actor = %self.actor.id(),
                    cards = self.queue.len(),
                    state = ?self.state,
                    "Swipe queue loaded"
                );
                self.filters = filters;
                Ok(self.queue.len())
            }
            Err(e) => {
                warn!(actor = %self.actor.id(), error = %e, "Swipe queue load failed");
                self.services
                    .notifier
                    .toast(ToastLevel::Error, texts::QUEUE_LOAD_FAILED);
                Err(e)
            }
        }
    }

    /// Load again with the filters of the last successful load.
    pub async fn reload(&mut self) -> Result<usize> {
        let filters = self.filters.clone();
        self.load(filters).await
    }

    async fn fetch(&self, filters: &SwipeFilters) -> Result<VecDeque<QueuedCard>> {
        let excluded = self.interacted().await?;

        let mut query = Query::new(self.plan.source).limit(self.batch);
        for predicate in self.plan.filter_predicates(filters) {
            query = query.filter(predicate);
        }
        if !excluded.is_empty() {
            query = query.filter(Predicate::not_in(
                "id",
                excluded.iter().map(|id| id.as_str().to_string()),
            ));
        }

        let records = self.services.records.query(query).await?;

        let mut cards = VecDeque::with_capacity(records.len());
        for record in records {
            let card = match self.plan.parse_card(record) {
                Ok(card) => card,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed card");
                    continue;
                }
            };
            // The backend may not honour the exclusion.
            if excluded.contains(card.id()) {
                continue;
            }
            let culture_fit = culture_fit(&self.actor_values, card.core_values());
            cards.push_back(QueuedCard { card, culture_fit });
        }
        Ok(cards)
    }

    /// Ids of the cards the actor already matched or favorited.
    async fn interacted(&self) -> Result<HashSet<CardId>> {
        let query = Query::new(self.plan.interactions)
            .filter(Predicate::eq(self.plan.actor_field, self.actor.id().as_str()));
        let records = self.services.records.query(query).await?;

        Ok(records
            .iter()
            .filter_map(|r| r.get(self.plan.target_field).and_then(Value::as_str))
            .map(CardId::from)
            .collect())
    }

    fn take_head(&mut self) -> Result<QueuedCard> {
        if self.state != QueueState::Presenting {
            return Err(ClientError::InvalidState(self.state));
        }
        let head = self
            .queue
            .pop_front()
            .ok_or(ClientError::InvalidState(QueueState::Exhausted))?;
        if self.queue.is_empty() {
            self.state = QueueState::Exhausted;
        }
        Ok(head)
    }

    fn count_swipe(&self) {
        if let Err(e) = self.counter.increment() {
            warn!(error = %e, "Failed to update daily swipe counter");
        }
    }

    /// Swipe right on the current card. The gesture always completes: the
    /// card leaves the queue and is returned, and a failed save is reported
    /// through a toast and [`Accepted::saved`].
    pub async fn accept(&mut self) -> Result<Accepted> {
        let head = self.take_head()?;
        self.count_swipe();

        let card_id = head.card.id().clone();
        let result = match self.plan.interaction(self.actor.id(), &card_id) {
            Ok(record) => self
                .services
                .records
                .insert(self.plan.interactions, record)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };

        let saved = match result {
            Ok(()) => {
                info!(actor = %self.actor.id(), card = %card_id, "Card accepted");
                self.services
                    .notifier
                    .toast(ToastLevel::Success, self.plan.saved_text());
                SaveOutcome::Saved
            }
            Err(e) if e.is_conflict() => {
                warn!(actor = %self.actor.id(), card = %card_id, "Card was already accepted");
                self.services
                    .notifier
                    .toast(ToastLevel::Error, texts::MATCH_ALREADY_EXISTS);
                SaveOutcome::AlreadySaved
            }
            Err(e) => {
                warn!(actor = %self.actor.id(), card = %card_id, error = %e, "Failed to save accept");
                self.services
                    .notifier
                    .toast(ToastLevel::Error, texts::MATCH_SAVE_FAILED);
                SaveOutcome::Failed
            }
        };

        Ok(Accepted { card: head, saved })
    }

    /// Swipe left on the current card. Nothing is persisted.
    pub fn reject(&mut self) -> Result<QueuedCard> {
        let head = self.take_head()?;
        self.count_swipe();
        debug!(actor = %self.actor.id(), card = %head.card.id(), "Card rejected");
        Ok(head)
    }

    pub fn daily_count(&self) -> Result<u32> {
        self.counter.today()
    }

    pub fn daily_progress(&self) -> Result<DailyProgress> {
        Ok(DailyProgress {
            count: self.counter.today()?,
            goal: self.daily_goal,
        })
    }
}
