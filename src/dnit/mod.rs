//! DNI lookup core: reply parsing and the conversation with the data bot.

pub mod parser;
pub mod service;

pub use parser::DniRecord;
pub use service::{DniImage, DniReport, LookupError, LookupService};
