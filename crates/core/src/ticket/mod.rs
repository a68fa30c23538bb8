//! Grading tickets and their durable storage.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTicketStore;
pub use store::{CreateTicketRequest, TicketError, TicketFilter, TicketStore};
pub use types::{
    SubtaskKind, SubtaskRecord, SubtaskStatus, Ticket, TicketResult, TicketStatus,
};
