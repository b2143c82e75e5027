use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::storage_date_serde;

/// Display theme for the surrounding surface, persisted under its own key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn from_stored(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("dark") => Theme::Dark,
            _ => Theme::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub duration_minutes: Option<u32>,

    #[serde(default)]
    pub remind: bool,

    #[serde(default)]
    pub completed: bool,

    #[serde(with = "storage_date_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(default, with = "storage_date_serde::option")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, with = "storage_date_serde::option")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new_active(
        id: u64,
        title: String,
        description: String,
        duration_minutes: Option<u32>,
        remind: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            description,
            duration_minutes,
            remind,
            completed: false,
            created_at: now,
            completed_at: None,
            deleted_at: None,
        }
    }
}
