pub mod ticket;

pub use ticket::{sort_tickets, FlightId, Ticket, TicketId, UserId};
