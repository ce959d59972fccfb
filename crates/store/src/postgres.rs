use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{PropertyId, ReservationId, ReservationToken, ShiftId, UserId};
use domain::{
    DateRange, Lock, LockKind, OwnerResponse, PaymentMethod, PaymentRecord, PaymentRecordStatus,
    PaymentStatus, Reservation, ReservationStatus,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::{StatusChange, Store};

/// PostgreSQL-backed store implementation.
///
/// The CAS guard is expressed directly in SQL:
/// `UPDATE ... WHERE id = $1 AND status = ANY($expected)`, so the
/// database serializes racing resolvers and the loser sees zero rows.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let status_raw: String = row.try_get("status")?;
        let status = ReservationStatus::parse(&status_raw)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown status '{status_raw}'")))?;

        let payment_raw: String = row.try_get("payment_status")?;
        let payment_status = PaymentStatus::parse(&payment_raw).ok_or_else(|| {
            StoreError::CorruptRow(format!("unknown payment status '{payment_raw}'"))
        })?;

        let owner_response = row
            .try_get::<Option<String>, _>("owner_response")?
            .map(|raw| match raw.as_str() {
                "approved" => Ok(OwnerResponse::Approved),
                "rejected" => Ok(OwnerResponse::Rejected),
                "timeout" => Ok(OwnerResponse::Timeout),
                other => Err(StoreError::CorruptRow(format!(
                    "unknown owner response '{other}'"
                ))),
            })
            .transpose()?;

        let start: DateTime<Utc> = row.try_get("start_date")?;
        let end: DateTime<Utc> = row.try_get("end_date")?;
        let dates = DateRange::new(start, end)
            .map_err(|e| StoreError::CorruptRow(format!("invalid date range: {e}")))?;

        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            property_id: PropertyId::from_uuid(row.try_get::<Uuid, _>("property_id")?),
            shift_id: ShiftId::new(row.try_get::<String, _>("shift_id")?),
            dates,
            reservation_token: ReservationToken::from_uuid(
                row.try_get::<Uuid, _>("reservation_token")?,
            ),
            status,
            payment_status,
            payment_attempts: row.try_get::<i32, _>("payment_attempts")? as u32,
            quoted_amount: domain::Money::from_cents(row.try_get("quoted_amount_cents")?),
            payment_reference: row.try_get("payment_reference")?,
            owner_response,
            owner_response_at: row.try_get("owner_response_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_lock(row: PgRow) -> Result<Lock> {
        let kind_raw: String = row.try_get("lock_type")?;
        let kind = LockKind::parse(&kind_raw)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown lock type '{kind_raw}'")))?;

        let start: DateTime<Utc> = row.try_get("start_date")?;
        let end: DateTime<Utc> = row.try_get("end_date")?;
        let dates = DateRange::new(start, end)
            .map_err(|e| StoreError::CorruptRow(format!("invalid date range: {e}")))?;

        Ok(Lock {
            property_id: PropertyId::from_uuid(row.try_get::<Uuid, _>("property_id")?),
            holder: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            reservation_token: ReservationToken::from_uuid(
                row.try_get::<Uuid, _>("reservation_token")?,
            ),
            dates,
            kind,
            is_active: row.try_get("is_active")?,
            locked_until: row.try_get("locked_until")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<PaymentRecord> {
        let status_raw: String = row.try_get("status")?;
        let status = match status_raw.as_str() {
            "pre_authorized" => PaymentRecordStatus::PreAuthorized,
            "captured" => PaymentRecordStatus::Captured,
            "failed" => PaymentRecordStatus::Failed,
            other => {
                return Err(StoreError::CorruptRow(format!(
                    "unknown payment record status '{other}'"
                )));
            }
        };

        Ok(PaymentRecord {
            id: row.try_get("id")?,
            reservation_id: ReservationId::from_uuid(row.try_get::<Uuid, _>("reservation_id")?),
            status,
            amount: domain::Money::from_cents(row.try_get("amount_cents")?),
            method: PaymentMethod::Card,
            attempt_number: row.try_get::<i32, _>("attempt_number")? as u32,
            gateway_response: row.try_get("gateway_response")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reservation (
                id, user_id, property_id, shift_id, start_date, end_date,
                reservation_token, status, payment_status, payment_attempts,
                quoted_amount_cents, payment_reference, owner_response,
                owner_response_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.user_id.as_uuid())
        .bind(reservation.property_id.as_uuid())
        .bind(reservation.shift_id.as_str())
        .bind(reservation.dates.start())
        .bind(reservation.dates.end())
        .bind(reservation.reservation_token.as_uuid())
        .bind(reservation.status.as_str())
        .bind(reservation.payment_status.as_str())
        .bind(reservation.payment_attempts as i32)
        .bind(reservation.quoted_amount.cents())
        .bind(reservation.payment_reference.as_deref())
        .bind(reservation.owner_response.map(|r| r.as_str()))
        .bind(reservation.owner_response_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query("SELECT * FROM reservation WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_reservation).transpose()
    }

    async fn transition(
        &self,
        id: ReservationId,
        expected: &[ReservationStatus],
        change: StatusChange,
    ) -> Result<Option<Reservation>> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();
        let now = Utc::now();

        let row = sqlx::query(
            r#"
            UPDATE reservation
            SET status = $3,
                payment_status = COALESCE($4, payment_status),
                payment_reference = COALESCE($5, payment_reference),
                owner_response = COALESCE($6, owner_response),
                owner_response_at = CASE WHEN $6::text IS NULL
                                         THEN owner_response_at ELSE $7 END,
                payment_attempts = payment_attempts + $8,
                updated_at = $7
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(&expected)
        .bind(change.status.as_str())
        .bind(change.payment_status.map(|s| s.as_str()))
        .bind(change.payment_reference.as_deref())
        .bind(change.owner_response.map(|r| r.as_str()))
        .bind(now)
        .bind(i32::from(change.increment_payment_attempts))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn reservations_with_payment_status(
        &self,
        payment_status: PaymentStatus,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query("SELECT * FROM reservation WHERE payment_status = $1")
            .bind(payment_status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    async fn insert_lock(&self, lock: &Lock) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO property_lock (
                property_id, user_id, reservation_token, start_date, end_date,
                lock_type, is_active, locked_until, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(lock.property_id.as_uuid())
        .bind(lock.holder.as_uuid())
        .bind(lock.reservation_token.as_uuid())
        .bind(lock.dates.start())
        .bind(lock.dates.end())
        .bind(lock.kind.as_str())
        .bind(lock.is_active)
        .bind(lock.locked_until)
        .bind(lock.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deactivate_lock(&self, token: ReservationToken) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE property_lock
            SET is_active = FALSE
            WHERE reservation_token = $1 AND is_active
            "#,
        )
        .bind(token.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn lock_by_token(&self, token: ReservationToken) -> Result<Option<Lock>> {
        let row = sqlx::query("SELECT * FROM property_lock WHERE reservation_token = $1")
            .bind(token.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_lock).transpose()
    }

    async fn active_locks_overlapping(
        &self,
        property: PropertyId,
        dates: &DateRange,
    ) -> Result<Vec<Lock>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM property_lock
            WHERE property_id = $1
              AND is_active
              AND start_date < $3
              AND $2 < end_date
            "#,
        )
        .bind(property.as_uuid())
        .bind(dates.start())
        .bind(dates.end())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_lock).collect()
    }

    async fn insert_payment(&self, payment: &PaymentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment (
                id, reservation_id, status, amount_cents, method,
                attempt_number, gateway_response, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id)
        .bind(payment.reservation_id.as_uuid())
        .bind(payment.status.as_str())
        .bind(payment.amount.cents())
        .bind("card")
        .bind(payment.attempt_number as i32)
        .bind(&payment.gateway_response)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_payment(
        &self,
        id: Uuid,
        status: PaymentRecordStatus,
        gateway_response: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment
            SET status = $2, gateway_response = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(&gateway_response)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn payments_for(&self, reservation_id: ReservationId) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM payment WHERE reservation_id = $1 ORDER BY attempt_number ASC",
        )
        .bind(reservation_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn next_attempt_number(&self, reservation_id: ReservationId) -> Result<u32> {
        let max: Option<i32> =
            sqlx::query_scalar("SELECT MAX(attempt_number) FROM payment WHERE reservation_id = $1")
                .bind(reservation_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        Ok(max.unwrap_or(0) as u32 + 1)
    }
}
