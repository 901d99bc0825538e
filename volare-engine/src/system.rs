use std::time::Duration;

use parking_lot::MutexGuard;
use serde::Serialize;
use tracing::{debug, info};
use volare_shared::{sort_tickets, FlightId, Ticket, TicketId, UserId};

use crate::config::EngineConfig;
use crate::flight::{FlightState, SeatMap};
use crate::{ReservationError, ReservationResult};

/// Point-in-time occupancy of one flight, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlightOccupancy {
    pub flight_id: FlightId,
    pub seat_capacity: usize,
    pub booked_count: usize,
}

/// The reservation engine: a fixed fleet of flights accepting concurrent
/// book, cancel, change and dump calls.
///
/// The fleet's shape is immutable after construction, so only the
/// per-flight locks guard anything. Callers share the system by reference
/// (typically inside an `Arc`) across threads.
pub struct ReservationSystem {
    flights: Vec<FlightState>,
}

impl ReservationSystem {
    /// Builds a fleet of `flight_count` flights with `seats_per_flight`
    /// seats each. Every flight starts empty with its ticket counter at 1.
    pub fn new(flight_count: u16, seats_per_flight: u32) -> Self {
        let flights = (0..flight_count)
            .map(|flight_id| FlightState::new(flight_id, seats_per_flight as usize))
            .collect();

        info!(
            "Initialized fleet: {} flights, {} seats each",
            flight_count, seats_per_flight
        );
        Self { flights }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.fleet.flight_count, config.fleet.seats_per_flight)
    }

    pub fn flight_count(&self) -> usize {
        self.flights.len()
    }

    /// The flight at `flight_id`, or [`ReservationError::InvalidFlight`]
    /// for an out-of-range index.
    pub fn flight(&self, flight_id: FlightId) -> ReservationResult<&FlightState> {
        self.flights
            .get(flight_id as usize)
            .ok_or(ReservationError::InvalidFlight(flight_id))
    }

    /// Books a seat on `flight_id`, failing fast if the flight is full.
    pub fn book(&self, user_id: UserId, flight_id: FlightId) -> ReservationResult<TicketId> {
        let ticket_id = self.flight(flight_id)?.try_book(user_id)?;
        debug!(
            "Booked ticket {} on flight {} for user {}",
            ticket_id, flight_id, user_id
        );
        Ok(ticket_id)
    }

    /// Blocking counterpart of [`ReservationSystem::book`]: waits until a
    /// seat frees up. Only an invalid flight index can fail it.
    pub fn book_waiting(&self, user_id: UserId, flight_id: FlightId) -> ReservationResult<TicketId> {
        let ticket_id = self.flight(flight_id)?.wait_and_book(user_id);
        debug!(
            "Booked ticket {} on flight {} for user {} after waiting",
            ticket_id, flight_id, user_id
        );
        Ok(ticket_id)
    }

    /// Bounded variant of [`ReservationSystem::book_waiting`]: gives up and
    /// returns `Ok(None)` if no seat frees up within `timeout`.
    pub fn book_waiting_timeout(
        &self,
        user_id: UserId,
        flight_id: FlightId,
        timeout: Duration,
    ) -> ReservationResult<Option<TicketId>> {
        Ok(self
            .flight(flight_id)?
            .wait_and_book_timeout(user_id, timeout))
    }

    /// Cancels the live ticket matching `(user_id, ticket_id)` on
    /// `flight_id`. Returns false for an invalid flight or a ticket that is
    /// not live; nothing is mutated in either case.
    pub fn cancel(&self, user_id: UserId, flight_id: FlightId, ticket_id: TicketId) -> bool {
        let Ok(flight) = self.flight(flight_id) else {
            return false;
        };

        let cancelled = flight.find_and_remove(user_id, ticket_id);
        if cancelled {
            debug!(
                "Cancelled ticket {} on flight {} for user {}",
                ticket_id, flight_id, user_id
            );
        }
        cancelled
    }

    /// Atomically moves a ticket from `old_flight_id` to `new_flight_id`.
    ///
    /// Cancel-on-old plus book-on-new execute as one transaction under both
    /// flights' locks: no other thread can observe the ticket on neither
    /// flight or on both. On any failure both flights are left untouched.
    /// The new ticket id comes from the new flight's own counter.
    pub fn change(
        &self,
        user_id: UserId,
        old_flight_id: FlightId,
        old_ticket_id: TicketId,
        new_flight_id: FlightId,
    ) -> ReservationResult<TicketId> {
        // Preconditions, before any lock is taken.
        let old_flight = self.flight(old_flight_id)?;
        let new_flight = self.flight(new_flight_id)?;
        if old_flight_id == new_flight_id {
            return Err(ReservationError::SameFlight(new_flight_id));
        }

        let (mut old_seats, mut new_seats) = lock_pair_ordered(old_flight, new_flight);

        let Some(offset) = old_seats.position_of(user_id, old_ticket_id) else {
            return Err(ReservationError::TicketNotFound {
                user_id,
                flight_id: old_flight_id,
                ticket_id: old_ticket_id,
            });
        };

        if new_seats.booked() == new_flight.seat_capacity() {
            return Err(ReservationError::FlightFull(new_flight_id));
        }

        // Book on the new flight before removing from the old one: the
        // passenger holds at least one ticket at every instant, even inside
        // the critical section.
        let new_ticket_id = new_seats.issue(user_id, new_flight_id);
        old_seats.remove_at(offset);

        new_flight.notify_waiters();
        old_flight.notify_waiters();

        debug!(
            "Changed user {} from flight {} (ticket {}) to flight {} (ticket {})",
            user_id, old_flight_id, old_ticket_id, new_flight_id, new_ticket_id
        );
        Ok(new_ticket_id)
    }

    /// Every flight's snapshot concatenated in flight-index order.
    ///
    /// Each per-flight snapshot is internally consistent, but the
    /// concatenation is not one global atomic view: flights already visited
    /// may mutate while later ones are being copied.
    pub fn dump_all_tickets(&self) -> Vec<Ticket> {
        let mut all = Vec::new();
        for flight in &self.flights {
            all.extend(flight.snapshot());
        }
        all
    }

    /// [`ReservationSystem::dump_all_tickets`] sorted by the packed ticket
    /// key, for deterministic reporting.
    pub fn dump_sorted(&self) -> Vec<Ticket> {
        let mut all = self.dump_all_tickets();
        sort_tickets(&mut all);
        all
    }

    /// Per-flight occupancy summary, same consistency caveat as the dump.
    pub fn occupancy(&self) -> Vec<FlightOccupancy> {
        self.flights
            .iter()
            .map(|flight| FlightOccupancy {
                flight_id: flight.flight_id(),
                seat_capacity: flight.seat_capacity(),
                booked_count: flight.booked_count(),
            })
            .collect()
    }
}

/// Acquires both flights' seat locks in ascending flight-index order and
/// returns the guards in `(first, second)` argument order.
///
/// The fixed total order over lock acquisition is the sole deadlock-safety
/// mechanism for cross-flight transfers: two opposite-direction changes
/// always contend for the lower-indexed flight first, so a circular wait
/// cannot form. Acquiring in request order instead would deadlock.
fn lock_pair_ordered<'a>(
    first: &'a FlightState,
    second: &'a FlightState,
) -> (MutexGuard<'a, SeatMap>, MutexGuard<'a, SeatMap>) {
    if first.flight_id() < second.flight_id() {
        let first_guard = first.lock_seats();
        let second_guard = second.lock_seats();
        (first_guard, second_guard)
    } else {
        let second_guard = second.lock_seats();
        let first_guard = first.lock_seats();
        (first_guard, second_guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_flight_rejected_everywhere() {
        let system = ReservationSystem::new(2, 4);

        assert_eq!(system.book(1, 2), Err(ReservationError::InvalidFlight(2)));
        assert_eq!(
            system.book_waiting(1, 9),
            Err(ReservationError::InvalidFlight(9))
        );
        assert_eq!(
            system.book_waiting_timeout(1, 2, Duration::from_millis(1)),
            Err(ReservationError::InvalidFlight(2))
        );
        assert!(!system.cancel(1, 2, 1));
        assert_eq!(
            system.change(1, 0, 1, 5),
            Err(ReservationError::InvalidFlight(5))
        );
        assert_eq!(
            system.change(1, 5, 1, 0),
            Err(ReservationError::InvalidFlight(5))
        );
    }

    #[test]
    fn test_same_flight_change_rejected() {
        let system = ReservationSystem::new(2, 4);
        let ticket = system.book(1, 0).unwrap();

        assert_eq!(
            system.change(1, 0, ticket, 0),
            Err(ReservationError::SameFlight(0))
        );
        // The ticket is untouched.
        assert_eq!(system.dump_all_tickets(), vec![Ticket::new(1, 0, ticket)]);
    }

    #[test]
    fn test_change_moves_ticket() {
        let system = ReservationSystem::new(3, 4);
        let old_ticket = system.book(7, 0).unwrap();
        system.book(8, 2).unwrap();

        let new_ticket = system.change(7, 0, old_ticket, 2).unwrap();

        // Fresh id from the target flight's own counter.
        assert_eq!(new_ticket, 2);
        assert_eq!(system.occupancy()[0].booked_count, 0);
        assert_eq!(system.occupancy()[2].booked_count, 2);

        // The old pair is gone; cancelling it finds nothing.
        assert!(!system.cancel(7, 0, old_ticket));
        assert!(system.cancel(7, 2, new_ticket));
    }

    #[test]
    fn test_change_not_found_leaves_both_flights_untouched() {
        let system = ReservationSystem::new(2, 4);
        let ticket = system.book(1, 0).unwrap();

        let result = system.change(2, 0, ticket, 1);
        assert_eq!(
            result,
            Err(ReservationError::TicketNotFound {
                user_id: 2,
                flight_id: 0,
                ticket_id: ticket,
            })
        );

        assert_eq!(system.occupancy()[0].booked_count, 1);
        assert_eq!(system.occupancy()[1].booked_count, 0);
        // No id was consumed on the target flight.
        assert_eq!(system.book(9, 1), Ok(1));
    }

    #[test]
    fn test_change_to_full_flight_keeps_old_ticket() {
        let system = ReservationSystem::new(2, 1);
        let old_ticket = system.book(1, 0).unwrap();
        system.book(2, 1).unwrap();

        assert_eq!(
            system.change(1, 0, old_ticket, 1),
            Err(ReservationError::FlightFull(1))
        );

        // Old ticket still live, target flight unchanged.
        assert!(system.cancel(1, 0, old_ticket));
        assert_eq!(system.occupancy()[1].booked_count, 1);
    }

    #[test]
    fn test_single_seat_fleet_scenario() {
        let system = ReservationSystem::new(2, 1);

        let ticket = system.book(7, 0).unwrap();
        assert_eq!(ticket, 1);
        assert_eq!(system.book(9, 0), Err(ReservationError::FlightFull(0)));

        // Moving to flight 1 issues ticket 1 from that flight's counter.
        let moved = system.change(7, 0, ticket, 1).unwrap();
        assert_eq!(moved, 1);
        assert_eq!(system.occupancy()[0].booked_count, 0);
        assert_eq!(system.occupancy()[1].booked_count, 1);

        assert!(system.cancel(7, 1, moved));
        assert!(system.dump_all_tickets().is_empty());
    }

    #[test]
    fn test_dump_concatenates_in_flight_order() {
        let system = ReservationSystem::new(3, 4);
        system.book(1, 2).unwrap();
        system.book(2, 0).unwrap();
        system.book(3, 1).unwrap();
        system.book(4, 0).unwrap();

        let dump = system.dump_all_tickets();
        let flight_ids: Vec<_> = dump.iter().map(|t| t.flight_id).collect();
        assert_eq!(flight_ids, vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_dump_sorted_is_ticket_id_major() {
        let system = ReservationSystem::new(2, 4);
        system.book(1, 0).unwrap();
        system.book(2, 0).unwrap();
        system.book(3, 1).unwrap();

        let sorted = system.dump_sorted();
        assert_eq!(
            sorted,
            vec![
                Ticket::new(1, 0, 1),
                Ticket::new(3, 1, 1),
                Ticket::new(2, 0, 2),
            ]
        );
    }

    #[test]
    fn test_lock_pair_ordered_maps_guards_to_arguments() {
        let lower = FlightState::new(0, 4);
        let higher = FlightState::new(1, 4);

        // Request order opposite to index order: guards must still come
        // back matched to their arguments.
        {
            let (mut first, _second) = lock_pair_ordered(&higher, &lower);
            first.issue(9, higher.flight_id());
        }

        assert_eq!(higher.booked_count(), 1);
        assert_eq!(lower.booked_count(), 0);
        assert_eq!(higher.snapshot(), vec![Ticket::new(9, 1, 1)]);
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig::default();
        let system = ReservationSystem::from_config(&config);
        assert_eq!(system.flight_count(), config.fleet.flight_count as usize);
    }
}
