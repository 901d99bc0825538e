use serde::{Deserialize, Serialize};

/// Opaque caller identity.
pub type UserId = u16;

/// Index of a flight within the fleet.
pub type FlightId = u16;

/// Per-flight ticket sequence number, starting at 1 and never reused.
pub type TicketId = u32;

/// A seat assignment binding a user to one flight.
///
/// `(flight_id, ticket_id)` identifies a live ticket at any instant;
/// `ticket_id` alone is unique per flight over the flight's entire lifetime,
/// including ids whose tickets have since been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub user_id: UserId,
    pub flight_id: FlightId,
    pub ticket_id: TicketId,
}

impl Ticket {
    pub fn new(user_id: UserId, flight_id: FlightId, ticket_id: TicketId) -> Self {
        Self {
            user_id,
            flight_id,
            ticket_id,
        }
    }

    /// Packs the ticket into its 64-bit comparison key: user id in bits
    /// 0..16, flight id in bits 16..32, ticket id in bits 32..64.
    ///
    /// Ascending key order is therefore ticket-id-major, then flight id,
    /// then user id.
    pub fn sort_key(&self) -> u64 {
        (self.ticket_id as u64) << 32 | (self.flight_id as u64) << 16 | self.user_id as u64
    }
}

/// Sorts tickets ascending by [`Ticket::sort_key`].
///
/// Two live tickets cannot compare equal: equal keys would mean equal
/// `(flight_id, ticket_id)` pairs, so an unstable sort is enough.
pub fn sort_tickets(tickets: &mut [Ticket]) {
    tickets.sort_unstable_by_key(Ticket::sort_key);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_key_packing() {
        let ticket = Ticket::new(1, 2, 3);
        assert_eq!(ticket.sort_key(), (3u64 << 32) | (2u64 << 16) | 1u64);

        // Field widths: each component occupies its own bit range.
        let ticket = Ticket::new(u16::MAX, u16::MAX, u32::MAX);
        assert_eq!(ticket.sort_key(), u64::MAX);
    }

    #[test]
    fn test_sort_is_ticket_id_major() {
        let mut tickets = vec![
            Ticket::new(9, 0, 2),
            Ticket::new(1, 3, 1),
            Ticket::new(5, 1, 1),
            Ticket::new(2, 0, 1),
        ];

        sort_tickets(&mut tickets);

        // Ticket id first, then flight id, then user id.
        assert_eq!(
            tickets,
            vec![
                Ticket::new(2, 0, 1),
                Ticket::new(5, 1, 1),
                Ticket::new(1, 3, 1),
                Ticket::new(9, 0, 2),
            ]
        );
    }

    #[test]
    fn test_serialized_field_names() {
        let value = serde_json::to_value(Ticket::new(7, 0, 1)).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "user_id": 7,
                "flight_id": 0,
                "ticket_id": 1,
            })
        );
    }
}
