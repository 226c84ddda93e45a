//! Structured logging schema and field name constants for lectern.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation tools can query by the same keys across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (pool creation), completed mutations |
//! | DEBUG | Decision points: query shape, permission denials, conflicts |
//! | TRACE | Per-row data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "database", "library_elements"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "repository", "permission_gate", "connection_guard"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create", "get", "search", "patch", "delete"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Organization scoping the operation.
pub const ORG_ID: &str = "org_id";

/// Acting user id.
pub const USER_ID: &str = "user_id";

/// Library element uid being operated on.
pub const ELEMENT_UID: &str = "element_uid";

/// Folder id involved in a permission check or move.
pub const FOLDER_ID: &str = "folder_id";

/// Element version after the operation.
pub const VERSION: &str = "version";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Total matches before pagination.
pub const TOTAL_COUNT: &str = "total_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
