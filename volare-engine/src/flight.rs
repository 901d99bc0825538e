use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use volare_shared::{FlightId, Ticket, TicketId, UserId};

use crate::{ReservationError, ReservationResult};

/// Mutable booking state of one flight. Only ever touched through the
/// owning [`FlightState`]'s mutex.
#[derive(Debug)]
pub(crate) struct SeatMap {
    next_ticket_id: TicketId,
    tickets: Vec<Ticket>,
}

impl SeatMap {
    fn new(seat_capacity: usize) -> Self {
        Self {
            next_ticket_id: 1,
            tickets: Vec::with_capacity(seat_capacity),
        }
    }

    /// Issue the next ticket id to `user_id`. The caller has already checked
    /// capacity under the lock.
    pub(crate) fn issue(&mut self, user_id: UserId, flight_id: FlightId) -> TicketId {
        let ticket_id = self.next_ticket_id;
        self.next_ticket_id += 1;
        self.tickets.push(Ticket::new(user_id, flight_id, ticket_id));
        ticket_id
    }

    /// Offset of the live ticket matching both fields, if any.
    pub(crate) fn position_of(&self, user_id: UserId, ticket_id: TicketId) -> Option<usize> {
        self.tickets
            .iter()
            .position(|t| t.user_id == user_id && t.ticket_id == ticket_id)
    }

    /// Swap-removes the ticket at `offset`. Ticket order within the flight
    /// is not preserved.
    pub(crate) fn remove_at(&mut self, offset: usize) {
        self.tickets.swap_remove(offset);
    }

    pub(crate) fn booked(&self) -> usize {
        self.tickets.len()
    }

    pub(crate) fn live(&self) -> &[Ticket] {
        &self.tickets
    }
}

/// One flight's capacity guard and ticket set.
///
/// A per-flight monitor: the mutable state sits behind a single mutex, and
/// every occupancy change is broadcast on the condvar so that blocked
/// bookers can re-check the capacity predicate. The capacity itself is
/// fixed at construction and readable without the lock.
pub struct FlightState {
    flight_id: FlightId,
    seat_capacity: usize,
    seats: Mutex<SeatMap>,
    occupancy_changed: Condvar,
}

impl FlightState {
    pub(crate) fn new(flight_id: FlightId, seat_capacity: usize) -> Self {
        Self {
            flight_id,
            seat_capacity,
            seats: Mutex::new(SeatMap::new(seat_capacity)),
            occupancy_changed: Condvar::new(),
        }
    }

    pub fn flight_id(&self) -> FlightId {
        self.flight_id
    }

    pub fn seat_capacity(&self) -> usize {
        self.seat_capacity
    }

    pub fn booked_count(&self) -> usize {
        self.seats.lock().booked()
    }

    pub fn seats_available(&self) -> usize {
        self.seat_capacity - self.seats.lock().booked()
    }

    pub fn is_full(&self) -> bool {
        self.seats.lock().booked() == self.seat_capacity
    }

    /// Fraction of seats currently booked, 0.0 for a zero-capacity flight.
    pub fn utilization(&self) -> f64 {
        if self.seat_capacity == 0 {
            return 0.0;
        }
        self.booked_count() as f64 / self.seat_capacity as f64
    }

    /// Books a seat if one is free, failing fast with
    /// [`ReservationError::FlightFull`] otherwise.
    ///
    /// A successful booking wakes the flight's waiters: any occupancy change
    /// may be of interest to an observer re-checking its predicate.
    pub fn try_book(&self, user_id: UserId) -> ReservationResult<TicketId> {
        let mut seats = self.seats.lock();

        if seats.booked() == self.seat_capacity {
            return Err(ReservationError::FlightFull(self.flight_id));
        }

        let ticket_id = seats.issue(user_id, self.flight_id);
        self.occupancy_changed.notify_all();
        Ok(ticket_id)
    }

    /// Blocks the calling thread until a seat is free, then books it.
    ///
    /// Never fails: the wait is unbounded. The predicate is re-checked in a
    /// loop after every wakeup, so spurious wakeups are harmless. No other
    /// flight's lock is held while waiting.
    pub fn wait_and_book(&self, user_id: UserId) -> TicketId {
        let mut seats = self.seats.lock();

        while seats.booked() == self.seat_capacity {
            self.occupancy_changed.wait(&mut seats);
        }

        let ticket_id = seats.issue(user_id, self.flight_id);
        self.occupancy_changed.notify_all();
        ticket_id
    }

    /// Bounded variant of [`FlightState::wait_and_book`]: waits up to
    /// `timeout` for a seat, returning `None` if the flight is still full
    /// when the deadline passes.
    pub fn wait_and_book_timeout(&self, user_id: UserId, timeout: Duration) -> Option<TicketId> {
        let deadline = Instant::now() + timeout;
        let mut seats = self.seats.lock();

        while seats.booked() == self.seat_capacity {
            let timed_out = self
                .occupancy_changed
                .wait_until(&mut seats, deadline)
                .timed_out();
            // A seat may have been freed in the same instant the deadline
            // passed; the loop condition decides.
            if timed_out && seats.booked() == self.seat_capacity {
                return None;
            }
        }

        let ticket_id = seats.issue(user_id, self.flight_id);
        self.occupancy_changed.notify_all();
        Some(ticket_id)
    }

    /// Removes the live ticket matching `(user_id, ticket_id)`, returning
    /// whether one was found. Removal swap-removes, so ticket order within
    /// the flight is not preserved.
    ///
    /// Waiters are woken on both paths; the not-found wake is a harmless
    /// spurious one, re-absorbed by the waiters' predicate loop.
    pub fn find_and_remove(&self, user_id: UserId, ticket_id: TicketId) -> bool {
        let mut seats = self.seats.lock();

        let removed = match seats.position_of(user_id, ticket_id) {
            Some(offset) => {
                seats.remove_at(offset);
                true
            }
            None => false,
        };

        self.occupancy_changed.notify_all();
        removed
    }

    /// Copy of the live tickets, internally consistent at the instant the
    /// lock was held.
    pub fn snapshot(&self) -> Vec<Ticket> {
        self.seats.lock().live().to_vec()
    }

    /// Raw access to the seat lock, for the cross-flight transfer protocol.
    pub(crate) fn lock_seats(&self) -> MutexGuard<'_, SeatMap> {
        self.seats.lock()
    }

    pub(crate) fn notify_waiters(&self) {
        self.occupancy_changed.notify_all();
    }
}
