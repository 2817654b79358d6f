//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;

/// The ID of a transaction.
pub type TransactionId = DatabaseId;

/// The ID of the independent worker that owns transactions, platforms and a fiscal profile.
pub type OwnerId = DatabaseId;

/// The ID of a platform and its fee schedule.
pub type PlatformId = DatabaseId;
