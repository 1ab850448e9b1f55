//! Quest ledger service: characters accept quests, complete them in FIFO
//! order, and earn experience.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ledger;
pub mod queue;

pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use ledger::Ledger;
