//! Account validation.

use super::model::Account;

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Account ID is empty.
    EmptyId,
    /// No IMAP configuration present.
    MissingImapConfig,
    /// IMAP host is empty.
    EmptyImapHost,
    /// IMAP port is invalid.
    InvalidImapPort,
    /// IMAP username is empty.
    EmptyImapUsername,
    /// IMAP password is empty.
    EmptyImapPassword,
    /// A folder name is empty.
    EmptyFolderName,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyId => "Account ID is required",
            Self::MissingImapConfig => "IMAP configuration is required",
            Self::EmptyImapHost => "IMAP server is required",
            Self::InvalidImapPort => "IMAP port must be 1-65535",
            Self::EmptyImapUsername => "IMAP username is required",
            Self::EmptyImapPassword => "IMAP password is required",
            Self::EmptyFolderName => "Folder names must not be empty",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyId => "id",
            Self::MissingImapConfig => "imap",
            Self::EmptyImapHost => "imap_host",
            Self::InvalidImapPort => "imap_port",
            Self::EmptyImapUsername => "imap_username",
            Self::EmptyImapPassword => "imap_password",
            Self::EmptyFolderName => "folders",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Check that an account carries everything needed to open a session.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_account(account: &Account) -> ValidationResult {
    let mut errors = Vec::new();

    if account.id.as_str().trim().is_empty() {
        errors.push(ValidationError::EmptyId);
    }

    match &account.imap {
        None => errors.push(ValidationError::MissingImapConfig),
        Some(imap) => {
            if imap.host.trim().is_empty() {
                errors.push(ValidationError::EmptyImapHost);
            }
            if imap.port == 0 {
                errors.push(ValidationError::InvalidImapPort);
            }
            if imap.username.trim().is_empty() {
                errors.push(ValidationError::EmptyImapUsername);
            }
            if imap.password.is_empty() {
                errors.push(ValidationError::EmptyImapPassword);
            }
        }
    }

    if account.folders.iter().any(|f| f.trim().is_empty()) {
        errors.push(ValidationError::EmptyFolderName);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
