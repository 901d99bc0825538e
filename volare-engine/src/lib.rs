pub mod config;
pub mod flight;
pub mod system;


pub use config::{EngineConfig, FleetConfig};
pub use flight::FlightState;
pub use system::{FlightOccupancy, ReservationSystem};

use volare_shared::{FlightId, TicketId, UserId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReservationError {
    #[error("Invalid flight: {0}")]
    InvalidFlight(FlightId),

    #[error("Change requested to the same flight: {0}")]
    SameFlight(FlightId),

    #[error("Flight full: {0}")]
    FlightFull(FlightId),

    #[error("Ticket not found: user {user_id}, flight {flight_id}, ticket {ticket_id}")]
    TicketNotFound {
        user_id: UserId,
        flight_id: FlightId,
        ticket_id: TicketId,
    },
}

pub type ReservationResult<T> = Result<T, ReservationError>;
