use chrono::{NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use clinibook_core::domain::appointment::{
    Appointment, AppointmentId, AppointmentStatus, BookingOutcome, ConflictReason, NewAppointment,
};
use clinibook_core::domain::session::PhoneNumber;
use clinibook_core::schedule::minutes_of_day;

use super::{
    format_date, format_time, parse_date, parse_time, parse_timestamp, parse_u32,
    AppointmentRepository, RepositoryError,
};
use crate::DbPool;

const APPOINTMENT_COLUMNS: &str = "id, patient_name, patient_phone, treatment, date, start_time,
    duration_minutes, status, created_at";

pub struct SqlAppointmentRepository {
    pool: DbPool,
}

impl SqlAppointmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn diagnose_conflict(
        &self,
        date: &str,
        start_time: &str,
    ) -> Result<ConflictReason, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                EXISTS(SELECT 1 FROM blocked_date WHERE date = ?1) AS blocked,
                EXISTS(
                    SELECT 1 FROM appointment
                    WHERE date = ?1 AND start_time = ?2 AND status != 'cancelled'
                ) AS taken",
        )
        .bind(date)
        .bind(start_time)
        .fetch_one(&self.pool)
        .await?;

        let reason = if row.try_get::<bool, _>("blocked")? {
            ConflictReason::DateBlocked
        } else if row.try_get::<bool, _>("taken")? {
            ConflictReason::SlotTaken
        } else {
            ConflictReason::Overlapping
        };
        Ok(reason)
    }

    async fn set_status(
        &self,
        id: AppointmentId,
        status: AppointmentStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE appointment SET status = ?, updated_at = ?
             WHERE id = ? AND status = 'scheduled'",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait::async_trait]
impl AppointmentRepository for SqlAppointmentRepository {
    async fn book(&self, request: NewAppointment) -> Result<BookingOutcome, RepositoryError> {
        let range = request
            .time_range()
            .map_err(|error| RepositoryError::InvalidInput(error.to_string()))?;
        let start_minute = i64::from(minutes_of_day(range.start));
        let end_minute = start_minute + i64::from(request.duration_minutes);
        let date = format_date(request.date);
        let start_time = format_time(range.start);
        let requested_at = request.requested_at.to_rfc3339();

        // One statement: the overlap and blocked-date checks run under the
        // same write lock as the insert. The partial unique index backs it.
        let inserted = sqlx::query(
            "INSERT INTO appointment (
                patient_name,
                patient_phone,
                treatment,
                date,
                start_time,
                start_minute,
                end_minute,
                duration_minutes,
                status,
                created_at,
                updated_at
             )
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'scheduled', ?9, ?9
             WHERE NOT EXISTS (
                SELECT 1 FROM appointment
                WHERE date = ?4
                  AND status != 'cancelled'
                  AND start_minute < ?7
                  AND end_minute > ?6
             )
             AND NOT EXISTS (SELECT 1 FROM blocked_date WHERE date = ?4)",
        )
        .bind(&request.patient_name)
        .bind(request.patient_phone.as_str())
        .bind(&request.treatment)
        .bind(&date)
        .bind(&start_time)
        .bind(start_minute)
        .bind(end_minute)
        .bind(i64::from(request.duration_minutes))
        .bind(&requested_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(result) if result.rows_affected() == 1 => {
                Ok(BookingOutcome::Booked(AppointmentId(result.last_insert_rowid())))
            }
            Ok(_) => self.diagnose_conflict(&date, &start_time).await.map(BookingOutcome::Conflict),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Ok(BookingOutcome::Conflict(ConflictReason::SlotTaken))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn cancel(&self, id: AppointmentId) -> Result<bool, RepositoryError> {
        self.set_status(id, AppointmentStatus::Cancelled).await
    }

    async fn complete(&self, id: AppointmentId) -> Result<bool, RepositoryError> {
        self.set_status(id, AppointmentStatus::Completed).await
    }

    async fn find_by_id(&self, id: AppointmentId) -> Result<Option<Appointment>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(appointment_from_row).transpose()
    }

    async fn list_active_for_date(&self, date: NaiveDate) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment
             WHERE date = ? AND status != 'cancelled'
             ORDER BY start_minute ASC"
        ))
        .bind(format_date(date))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(appointment_from_row).collect()
    }

    async fn list_for_phone(&self, phone: &PhoneNumber) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment
             WHERE patient_phone = ?
             ORDER BY date ASC, start_minute ASC"
        ))
        .bind(phone.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(appointment_from_row).collect()
    }
}

fn appointment_from_row(row: SqliteRow) -> Result<Appointment, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = AppointmentStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown appointment status `{status_raw}`"))
    })?;

    Ok(Appointment {
        id: AppointmentId(row.try_get("id")?),
        patient_name: row.try_get("patient_name")?,
        patient_phone: PhoneNumber(row.try_get("patient_phone")?),
        treatment: row.try_get("treatment")?,
        date: parse_date("date", row.try_get("date")?)?,
        start_time: parse_time("start_time", row.try_get("start_time")?)?,
        duration_minutes: parse_u32("duration_minutes", row.try_get("duration_minutes")?)?,
        status,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
