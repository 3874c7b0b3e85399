//! Error Reporting overview
//!
//! Lists error group statistics for the current project.

use crate::gcp::client::with_query;
use crate::gcp::{DataSourceError, GcpClient};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Time window for group statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TimePeriod {
    #[value(name = "1h")]
    OneHour,
    #[value(name = "6h")]
    SixHours,
    #[default]
    #[value(name = "1d")]
    OneDay,
    #[value(name = "1w")]
    OneWeek,
    #[value(name = "30d")]
    ThirtyDays,
}

impl TimePeriod {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::OneHour => "PERIOD_1_HOUR",
            Self::SixHours => "PERIOD_6_HOURS",
            Self::OneDay => "PERIOD_1_DAY",
            Self::OneWeek => "PERIOD_1_WEEK",
            Self::ThirtyDays => "PERIOD_30_DAYS",
        }
    }
}

/// int64 counters arrive as JSON strings
fn de_count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Str(String),
        Num(u64),
    }

    match Option::<Count>::deserialize(d)? {
        None => Ok(0),
        Some(Count::Num(n)) => Ok(n),
        Some(Count::Str(s)) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContext {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub service_context: ServiceContext,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorGroupStats {
    #[serde(default)]
    pub group: ErrorGroup,
    #[serde(default, deserialize_with = "de_count")]
    pub count: u64,
    #[serde(default, deserialize_with = "de_count")]
    pub affected_users_count: u64,
    #[serde(default)]
    pub first_seen_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub representative: ErrorEvent,
}

impl ErrorGroupStats {
    /// First line of the representative error message
    pub fn summary(&self) -> &str {
        self.representative.message.lines().next().unwrap_or("")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListGroupStatsResponse {
    #[serde(default)]
    error_group_stats: Vec<Option<ErrorGroupStats>>,
}

/// List error group statistics for the period. A `null` element ends the list.
pub async fn list_group_stats(
    client: &GcpClient,
    period: TimePeriod,
) -> Result<Vec<ErrorGroupStats>, DataSourceError> {
    let url = with_query(
        &client.error_reporting_url("groupStats"),
        &[("timeRange.period", Some(period.as_api_str()))],
    )?;

    let response = client.get(&url).await?;
    if response.is_null() {
        return Ok(Vec::new());
    }

    let parsed: ListGroupStatsResponse = serde_json::from_value(response)?;
    let stats: Vec<ErrorGroupStats> = parsed
        .error_group_stats
        .into_iter()
        .map_while(|s| s)
        .collect();

    tracing::debug!("Got {} error groups", stats.len());
    Ok(stats)
}
