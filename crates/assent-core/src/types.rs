use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Time
// =============================================================================

/// Milliseconds since the UNIX epoch (UTC).
///
/// Stored as a plain integer in SQLite so that expiry comparisons happen in
/// the database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs.saturating_mul(1000)))
    }

    pub fn minus_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_sub(secs.saturating_mul(1000)))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

/// Source of the current time.
///
/// Everything that compares against `expires_at` reads the time through a
/// clock so expiry can be exercised without sleeping.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually driven clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.0)),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.millis.fetch_add(secs * 1000, Ordering::SeqCst);
    }

    pub fn set(&self, ts: Timestamp) {
        self.millis.store(ts.0, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Timestamp::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.millis.load(Ordering::SeqCst))
    }
}

// =============================================================================
// Enums
// =============================================================================

/// The side-effecting action an intent proposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    EmailSend,
    DeclarationCreate,
    PaymentExecute,
}

impl IntentKind {
    pub const ALL: [IntentKind; 3] = [
        IntentKind::EmailSend,
        IntentKind::DeclarationCreate,
        IntentKind::PaymentExecute,
    ];

    /// Canonical storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::EmailSend => "email_send",
            IntentKind::DeclarationCreate => "declaration_create",
            IntentKind::PaymentExecute => "payment_execute",
        }
    }

    /// Resolve a conversational kind hint ("email", "pagamento", "email_send").
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim().to_lowercase();
        if let Ok(kind) = hint.parse() {
            return Some(kind);
        }
        match hint.as_str() {
            "email" | "e-mail" | "mail" => Some(IntentKind::EmailSend),
            "declaration" | "declaracao" | "declaração" | "customs" | "duimp" => {
                Some(IntentKind::DeclarationCreate)
            }
            "payment" | "pagamento" | "pix" | "transfer" => Some(IntentKind::PaymentExecute),
            _ => None,
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IntentKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "email_send" => Ok(IntentKind::EmailSend),
            "declaration_create" => Ok(IntentKind::DeclarationCreate),
            "payment_execute" => Ok(IntentKind::PaymentExecute),
            _ => Err(format!("Unknown intent kind: {}", s)),
        }
    }
}

/// Lifecycle status of a pending intent.
///
/// `Pending -> Executing -> Executed`, with `Cancelled` and `Expired` as the
/// other terminal states and `Executing -> Pending` as the only backward edge
/// (re-offer after a retryable failure).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Executing,
    Executed,
    Cancelled,
    Expired,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Executing => "executing",
            IntentStatus::Executed => "executed",
            IntentStatus::Cancelled => "cancelled",
            IntentStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Executed | IntentStatus::Cancelled | IntentStatus::Expired
        )
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IntentStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IntentStatus::Pending),
            "executing" => Ok(IntentStatus::Executing),
            "executed" => Ok(IntentStatus::Executed),
            "cancelled" => Ok(IntentStatus::Cancelled),
            "expired" => Ok(IntentStatus::Expired),
            _ => Err(format!("Unknown intent status: {}", s)),
        }
    }
}

// =============================================================================
// Entity Structs
// =============================================================================

/// A proposed side-effecting action awaiting user confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingIntent {
    pub intent_id: Uuid,
    pub kind: IntentKind,
    /// Fully resolved arguments, stored verbatim.
    pub normalized_args: serde_json::Value,
    /// Sanitized, length-capped summary. Safe to log and display.
    pub preview_text: String,
    pub status: IntentStatus,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub resolution_note: Option<String>,
    pub owner_session_id: String,
    /// When the last successful lock was taken.
    pub locked_at: Option<Timestamp>,
    /// Number of successful locks (execution attempts).
    pub attempts: u32,
}

impl PendingIntent {
    /// Whether the TTL has elapsed at `now`, regardless of stored status.
    pub fn is_past_deadline(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

/// Numbered list shown to a session when several intents of one kind await
/// confirmation. `candidates[n - 1]` is what reply "n" selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoicePrompt {
    pub owner_session_id: String,
    pub kind: IntentKind,
    pub candidates: Vec<Uuid>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl ChoicePrompt {
    /// Map a 1-based reply index to a candidate.
    pub fn candidate(&self, index: usize) -> Option<Uuid> {
        index
            .checked_sub(1)
            .and_then(|i| self.candidates.get(i))
            .copied()
    }
}

// =============================================================================
// Tests
// =============================================================================
