use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use clinibook_core::clock::CivilClock;
use clinibook_core::config::CalendarConfig;
use clinibook_core::schedule::TimeRange;

use crate::error::TransportError;

const SERVICE: &str = "calendar";

/// Busy intervals of the external calendar for one civil day.
#[async_trait]
pub trait BusyTimeSource: Send + Sync {
    async fn busy_intervals(&self, date: NaiveDate) -> Result<Vec<TimeRange>, TransportError>;
}

/// Used when no external calendar is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBusyTimeSource;

#[async_trait]
impl BusyTimeSource for NoopBusyTimeSource {
    async fn busy_intervals(&self, _date: NaiveDate) -> Result<Vec<TimeRange>, TransportError> {
        Ok(Vec::new())
    }
}

/// Fixed answers per date, or a fixed failure.
#[derive(Clone, Debug, Default)]
pub struct StaticBusyTimeSource {
    busy: HashMap<NaiveDate, Vec<TimeRange>>,
    failure: Option<TransportError>,
}

impl StaticBusyTimeSource {
    pub fn with_busy(mut self, date: NaiveDate, ranges: Vec<TimeRange>) -> Self {
        self.busy.insert(date, ranges);
        self
    }

    pub fn failing(detail: &str) -> Self {
        Self {
            busy: HashMap::new(),
            failure: Some(TransportError::Request { service: SERVICE, detail: detail.to_owned() }),
        }
    }
}

#[async_trait]
impl BusyTimeSource for StaticBusyTimeSource {
    async fn busy_intervals(&self, date: NaiveDate) -> Result<Vec<TimeRange>, TransportError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(self.busy.get(&date).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    time_zone: &'a str,
    items: [FreeBusyItem<'a>; 1],
}

#[derive(Debug, Serialize)]
struct FreeBusyItem<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, CalendarBusy>,
}

#[derive(Debug, Deserialize)]
struct CalendarBusy {
    #[serde(default)]
    busy: Vec<BusyPeriod>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BusyPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Free/busy client for an HTTP calendar API.
#[derive(Clone, Debug)]
pub struct HttpCalendarClient {
    client: reqwest::Client,
    base_url: String,
    calendar_id: String,
    api_key: SecretString,
    civil: CivilClock,
}

impl HttpCalendarClient {
    pub fn new(
        base_url: &str,
        calendar_id: &str,
        api_key: SecretString,
        civil: CivilClock,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::request(SERVICE, error))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            calendar_id: calendar_id.to_owned(),
            api_key,
            civil,
        })
    }

    pub fn from_config(config: &CalendarConfig, civil: CivilClock) -> Result<Self, TransportError> {
        let missing = |field: &str| TransportError::NotConfigured(format!("calendar.{field} is not set"));
        let base_url = config.base_url.as_deref().ok_or_else(|| missing("base_url"))?;
        let calendar_id = config.calendar_id.as_deref().ok_or_else(|| missing("calendar_id"))?;
        let api_key = config.api_key.clone().ok_or_else(|| missing("api_key"))?;

        Self::new(base_url, calendar_id, api_key, civil, Duration::from_secs(config.timeout_secs))
    }

    fn clip_to_day(&self, date: NaiveDate, period: &BusyPeriod) -> Option<TimeRange> {
        let day_start = date.and_time(NaiveTime::MIN);
        let day_end = date.succ_opt().map(|next| next.and_time(NaiveTime::MIN))?;
        let start = self.civil.local(period.start).max(day_start);
        let end = self.civil.local(period.end).min(day_end);
        if start >= end {
            return None;
        }
        TimeRange::new(start.time(), end_of_range(end, day_end))
    }
}

/// A range running to midnight keeps the last representable instant of the day.
fn end_of_range(end: NaiveDateTime, day_end: NaiveDateTime) -> NaiveTime {
    if end >= day_end {
        NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
    } else {
        end.time()
    }
}

#[async_trait]
impl BusyTimeSource for HttpCalendarClient {
    async fn busy_intervals(&self, date: NaiveDate) -> Result<Vec<TimeRange>, TransportError> {
        let (day_start, day_end) = self.civil.day_bounds(date);
        let zone = self.civil.zone();
        let request = FreeBusyRequest {
            time_min: day_start.to_rfc3339(),
            time_max: day_end.to_rfc3339(),
            time_zone: zone.name(),
            items: [FreeBusyItem { id: &self.calendar_id }],
        };

        let response = self
            .client
            .post(format!("{}/freeBusy", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| TransportError::request(SERVICE, error))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(event_name = "calendar.free_busy.failed", status = status.as_u16(), %date);
            return Err(TransportError::Status { service: SERVICE, status: status.as_u16(), body });
        }

        let payload = response.json::<FreeBusyResponse>().await.map_err(|error| {
            TransportError::Malformed { service: SERVICE, detail: error.to_string() }
        })?;
        let calendar = payload.calendars.get(&self.calendar_id).ok_or_else(|| TransportError::Malformed {
            service: SERVICE,
            detail: format!("calendar `{}` missing from response", self.calendar_id),
        })?;
        if !calendar.errors.is_empty() {
            return Err(TransportError::Malformed {
                service: SERVICE,
                detail: format!("calendar reported errors: {}", serde_json::Value::from(calendar.errors.clone())),
            });
        }

        let mut ranges = calendar
            .busy
            .iter()
            .filter_map(|period| self.clip_to_day(date, period))
            .collect::<Vec<_>>();
        ranges.sort();
        debug!(event_name = "calendar.free_busy.loaded", %date, busy = ranges.len());
        Ok(ranges)
    }
}
