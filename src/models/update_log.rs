use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Success,
    Error,
}

impl UpdateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateStatus::Success => "success",
            UpdateStatus::Error => "error",
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(UpdateStatus::Success),
            "error" => Ok(UpdateStatus::Error),
            other => Err(format!("unknown update status: {other}")),
        }
    }
}

/// One audit row per source per cycle. Never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLog {
    pub id: i64,
    pub source_id: i64,
    pub status: UpdateStatus,
    pub message: String,
    pub articles_count: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUpdateLog {
    pub source_id: i64,
    pub status: UpdateStatus,
    pub message: String,
    pub articles_count: i64,
    pub created_at: NaiveDateTime,
}

impl NewUpdateLog {
    pub fn success(source_id: i64, processed: usize, inserted: usize) -> Self {
        Self {
            source_id,
            status: UpdateStatus::Success,
            message: format!("Processed {processed} articles, {inserted} new"),
            articles_count: inserted as i64,
            created_at: super::now_naive_utc(),
        }
    }

    pub fn error(source_id: i64, reason: impl fmt::Display) -> Self {
        Self {
            source_id,
            status: UpdateStatus::Error,
            message: format!("Error: {reason}"),
            articles_count: 0,
            created_at: super::now_naive_utc(),
        }
    }
}
