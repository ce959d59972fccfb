//! The lock ledger: external hold plus local mirror row.
//!
//! Acquisition is external-first. If the authority grants the hold but
//! the local insert fails, the hold is released again before the error
//! propagates, so the two sides never disagree for longer than one
//! failed request.
//!
//! Release is local-first and idempotent. Deactivating the local row is
//! the authoritative step; a failure talking to the external authority
//! afterwards is logged and swallowed, since its own TTL reaps orphaned
//! holds.

use common::{PropertyId, ReservationToken, ShiftId, UserId};
use domain::{DateRange, Lock};
use store::Store;
use tracing::{debug, warn};

use crate::error::{GatewayError, Result, SagaError};
use crate::gateways::InventoryGateway;

/// Pairs the external inventory hold with the local lock table.
#[derive(Debug, Clone)]
pub struct LockLedger<S, I> {
    store: S,
    inventory: I,
}

impl<S, I> LockLedger<S, I>
where
    S: Store + Clone,
    I: InventoryGateway + Clone,
{
    /// Creates a ledger over the given store and inventory gateway.
    pub fn new(store: S, inventory: I) -> Self {
        Self { store, inventory }
    }

    /// Takes the external hold and mirrors it locally.
    ///
    /// The local overlap check is advisory and catches most conflicts
    /// before the network round trip; the external authority's answer
    /// is the one that decides.
    #[tracing::instrument(skip(self, dates), fields(%property, %token))]
    pub async fn acquire(
        &self,
        property: PropertyId,
        holder: UserId,
        token: ReservationToken,
        dates: &DateRange,
        shift: &ShiftId,
    ) -> Result<Lock> {
        let conflicts = self
            .store
            .active_locks_overlapping(property, dates)
            .await?;
        if !conflicts.is_empty() {
            debug!(%property, "local ledger already holds an overlapping lock");
            return Err(SagaError::ResourceUnavailable(property));
        }

        let grant = match self.inventory.lock(property, dates, shift, token).await {
            Ok(grant) => grant,
            Err(GatewayError::Declined(reason)) => {
                debug!(%property, %reason, "inventory authority declined the lock");
                return Err(SagaError::ResourceUnavailable(property));
            }
            Err(GatewayError::Unavailable(reason)) => {
                return Err(SagaError::UpstreamUnavailable {
                    service: "inventory",
                    reason,
                });
            }
        };

        let mut lock = Lock::for_reservation(
            property,
            holder,
            token,
            *dates,
            chrono::Duration::zero(),
        );
        lock.locked_until = grant.expires_at;

        if let Err(err) = self.store.insert_lock(&lock).await {
            // Undo the external hold so the sides stay in agreement.
            if let Err(release_err) = self.inventory.release(token).await {
                warn!(%token, error = %release_err, "failed to undo external hold after insert error");
            }
            return Err(err.into());
        }

        Ok(lock)
    }

    /// Releases the hold on both sides. Safe to call any number of
    /// times for the same token; only the first call does anything.
    ///
    /// Never fails: release runs on paths that must complete (failure
    /// handling, expiry), so problems are logged and absorbed here.
    #[tracing::instrument(skip(self), fields(%token))]
    pub async fn release(&self, token: ReservationToken) {
        match self.store.deactivate_lock(token).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(%token, "lock already inactive, nothing to release");
                return;
            }
            Err(err) => {
                warn!(%token, error = %err, "failed to deactivate local lock");
                return;
            }
        }

        if let Err(err) = self.inventory.release(token).await {
            // The authority's own TTL will reap the hold.
            warn!(%token, error = %err, "external release failed, relying on hold TTL");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::{OwnerId, ShiftId};
    use domain::Money;
    use store::InMemoryStore;

    use crate::gateways::inventory::test_property;
    use crate::gateways::InMemoryInventoryGateway;

    fn range(start_hour: u32, end_hour: u32) -> DateRange {
        DateRange::new(
            Utc.with_ymd_and_hms(2025, 6, 1, start_hour, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, end_hour, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn ledger() -> (LockLedger<InMemoryStore, InMemoryInventoryGateway>, PropertyId, InMemoryInventoryGateway, InMemoryStore)
    {
        let store = InMemoryStore::new();
        let inventory = InMemoryInventoryGateway::new();
        let property = test_property(OwnerId::new(), Money::from_cents(10_000));
        let property_id = property.id;
        inventory.add_property(property);
        (
            LockLedger::new(store.clone(), inventory.clone()),
            property_id,
            inventory,
            store,
        )
    }

    #[tokio::test]
    async fn test_acquire_mirrors_external_hold() {
        let (ledger, property, inventory, store) = ledger();
        let token = ReservationToken::new();

        let lock = ledger
            .acquire(property, UserId::new(), token, &range(9, 17), &ShiftId::new("m"))
            .await
            .unwrap();

        assert!(lock.is_active);
        assert!(inventory.has_hold(token));
        assert_eq!(store.active_lock_count().await, 1);
    }

    #[tokio::test]
    async fn test_overlapping_acquire_is_unavailable() {
        let (ledger, property, _inventory, _store) = ledger();
        let shift = ShiftId::new("m");

        ledger
            .acquire(property, UserId::new(), ReservationToken::new(), &range(9, 17), &shift)
            .await
            .unwrap();

        let result = ledger
            .acquire(property, UserId::new(), ReservationToken::new(), &range(12, 20), &shift)
            .await;
        assert!(matches!(result, Err(SagaError::ResourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_external_failure_swallowed() {
        let (ledger, property, inventory, store) = ledger();
        let token = ReservationToken::new();

        ledger
            .acquire(property, UserId::new(), token, &range(9, 17), &ShiftId::new("m"))
            .await
            .unwrap();

        inventory.set_fail_on_release(true);
        ledger.release(token).await;
        assert_eq!(store.active_lock_count().await, 0);
        // External hold survived, its TTL will reap it.
        assert!(inventory.has_hold(token));

        // Second release is a no-op and never reaches the authority.
        ledger.release(token).await;
        assert_eq!(store.active_lock_count().await, 0);
    }

    #[tokio::test]
    async fn test_authority_outage_surfaces_as_upstream_unavailable() {
        let (ledger, property, inventory, store) = ledger();
        inventory.set_fail_on_lock(true);

        let result = ledger
            .acquire(
                property,
                UserId::new(),
                ReservationToken::new(),
                &range(9, 17),
                &ShiftId::new("m"),
            )
            .await;

        assert!(matches!(
            result,
            Err(SagaError::UpstreamUnavailable { service: "inventory", .. })
        ));
        assert_eq!(store.active_lock_count().await, 0);
    }
}
