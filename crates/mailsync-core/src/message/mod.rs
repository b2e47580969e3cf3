//! Message model and parser adapter.

mod model;
pub mod parse;

pub use model::{Attachment, DeliveryStatus, Message, MessageBody, synthetic_message_id};
pub use parse::{ParseError, ParsedMessage, parse_message};
