//! In-memory booking store backed by DashMap.
//!
//! Production: replace with PostgreSQL (sqlx) or similar ACID store. The
//! entry lock serializes concurrent transitions on the same booking, and the
//! `version` field supports optimistic saves for load-modify-store flows
//! that cannot run under the entry lock.

use dashmap::DashMap;
use uuid::Uuid;

use adspace_core::error::{MarketError, MarketResult};
use adspace_core::types::{Booking, BookingStatus};

pub struct BookingStore {
    bookings: DashMap<Uuid, Booking>,
}

impl BookingStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
        }
    }

    pub fn insert(&self, booking: Booking) {
        self.bookings.insert(booking.id, booking);
    }

    pub fn get(&self, id: Uuid) -> MarketResult<Booking> {
        self.bookings
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(MarketError::NotFound {
                entity: "booking",
                id,
            })
    }

    pub fn list(&self) -> Vec<Booking> {
        self.bookings.iter().map(|r| r.value().clone()).collect()
    }

    pub fn list_by_status(&self, status: BookingStatus) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|r| r.value().status == status)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Mutate a booking atomically under the entry lock. The closure either
    /// returns `Ok` (version and `updated_at` are bumped) or an error, in
    /// which case no mutation is visible.
    pub fn update<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Booking) -> MarketResult<R>,
    ) -> MarketResult<R> {
        let mut entry = self.bookings.get_mut(&id).ok_or(MarketError::NotFound {
            entity: "booking",
            id,
        })?;
        // Work on a copy so a failing closure leaves the entry untouched.
        let mut candidate = entry.value().clone();
        let result = f(&mut candidate)?;
        candidate.version += 1;
        candidate.updated_at = chrono::Utc::now();
        *entry.value_mut() = candidate;
        Ok(result)
    }

    /// Optimistic save for flows that loaded a booking, worked outside the
    /// lock, and want to write back. Fails with `ConcurrencyConflict` if the
    /// stored version moved.
    pub fn save(&self, booking: Booking) -> MarketResult<Booking> {
        let mut entry = self
            .bookings
            .get_mut(&booking.id)
            .ok_or(MarketError::NotFound {
                entity: "booking",
                id: booking.id,
            })?;
        let found = entry.value().version;
        if found != booking.version {
            return Err(MarketError::ConcurrencyConflict {
                entity: "booking",
                id: booking.id,
                expected: booking.version,
                found,
            });
        }
        let mut saved = booking;
        saved.version += 1;
        saved.updated_at = chrono::Utc::now();
        *entry.value_mut() = saved.clone();
        Ok(saved)
    }
}

impl Default for BookingStore {
    fn default() -> Self {
        Self::new()
    }
}
