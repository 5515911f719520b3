//! Typed device settings and the daily swipe counter.
//!
//! Settings live in the injected [`KeyValueStore`]; every key is rendered
//! from a [`SettingKey`] so no component builds key strings by hand.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, warn};

use talento_shared::service::KeyValueStore;
use talento_shared::ParticipantId;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SettingKey {
    /// Cards swiped on a calendar day.
    DailySwipes(NaiveDate),
    /// Whether a participant dismissed the onboarding tour.
    OnboardingSeen(ParticipantId),
}

impl SettingKey {
    pub fn as_key(&self) -> String {
        match self {
            Self::DailySwipes(date) => format!("swipes:{}", date.format("%Y-%m-%d")),
            Self::OnboardingSeen(id) => format!("onboarding_seen:{id}"),
        }
    }
}

/// Source of the current calendar day.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local-time calendar of the device.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock pinned to one day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn KeyValueStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, key: &SettingKey) -> Result<Option<String>> {
        Ok(self.store.get(&key.as_key())?)
    }

    pub fn set(&self, key: &SettingKey, value: &str) -> Result<()> {
        Ok(self.store.set(&key.as_key(), value)?)
    }

    pub fn onboarding_seen(&self, participant: &ParticipantId) -> Result<bool> {
        let value = self.get(&SettingKey::OnboardingSeen(participant.clone()))?;
        Ok(value.as_deref() == Some("true"))
    }

    pub fn mark_onboarding_seen(&self, participant: &ParticipantId) -> Result<()> {
        self.set(&SettingKey::OnboardingSeen(participant.clone()), "true")
    }
}

/// Per-day count of swiped cards. A day with no stored value counts zero.
#[derive(Clone)]
pub struct DailyCounter {
    settings: Settings,
    clock: Arc<dyn Clock>,
}

impl DailyCounter {
    pub fn new(settings: Settings, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    pub fn count_on(&self, date: NaiveDate) -> Result<u32> {
        let raw = self.settings.get(&SettingKey::DailySwipes(date))?;
        Ok(match raw {
            None => 0,
            Some(value) => value.parse().unwrap_or_else(|_| {
                warn!(%date, value = %value, "Corrupt daily counter, treating as zero");
                0
            }),
        })
    }

    pub fn today(&self) -> Result<u32> {
        self.count_on(self.clock.today())
    }

    /// Add one to today's count and return the new value. Read-modify-write
    /// without locking: concurrent writers race, the last one wins.
    pub fn increment(&self) -> Result<u32> {
        let date = self.clock.today();
        let next = self.count_on(date)?.saturating_add(1);
        self.settings
            .set(&SettingKey::DailySwipes(date), &next.to_string())?;
        debug!(%date, count = next, "Daily swipe counter incremented");
        Ok(next)
    }
}
