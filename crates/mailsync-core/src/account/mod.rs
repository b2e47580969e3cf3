//! Account management module.
//!
//! Provides the account configuration consumed by the synchronizer and its
//! validation.

mod model;
mod validation;

pub use model::{Account, AccountId, DEFAULT_FOLDER, ImapConfig, Provider};
pub use validation::{ValidationError, ValidationResult, validate_account};
