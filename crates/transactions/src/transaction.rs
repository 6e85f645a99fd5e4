use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ajo_core::{Aggregate, AggregateId, AggregateRoot, Amount, DomainError, DomainResult, UserId};
use ajo_events::Event;

use crate::id::TransactionId;

pub const DESCRIPTION_MAX_CHARS: usize = 500;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Contribution,
    Payout,
    Withdrawal,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Contribution => "contribution",
            TransactionType::Payout => "payout",
            TransactionType::Withdrawal => "withdrawal",
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Card,
    BankTransfer,
    Wallet,
}

/// Processor-side details attached to a payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub card_last_four: Option<String>,
    pub card_type: Option<String>,
    pub processor_reference: Option<String>,
    pub bank_name: Option<String>,
}

impl PaymentDetails {
    fn validate(&self) -> DomainResult<()> {
        if let Some(last_four) = &self.card_last_four {
            if last_four.chars().count() > 4 {
                return Err(DomainError::validation("cardLastFour cannot exceed 4 characters"));
            }
        }
        Ok(())
    }
}

/// Aggregate root: Transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    id: AggregateId,
    transaction_id: Option<TransactionId>,
    user_id: Option<UserId>,
    group_id: Option<AggregateId>,
    kind: TransactionType,
    amount: u64,
    status: TransactionStatus,
    payment_method: PaymentMethod,
    payment_details: PaymentDetails,
    metadata: serde_json::Value,
    description: Option<String>,
    reference: Option<String>,
    supersedes: Option<TransactionId>,
    failure_reason: Option<String>,
    created_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Transaction {
    /// Create an empty, not-yet-recorded aggregate instance for rehydration.
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            transaction_id: None,
            user_id: None,
            group_id: None,
            kind: TransactionType::Contribution,
            amount: 0,
            status: TransactionStatus::Pending,
            payment_method: PaymentMethod::default(),
            payment_details: PaymentDetails::default(),
            metadata: serde_json::Value::Null,
            description: None,
            reference: None,
            supersedes: None,
            failure_reason: None,
            created_at: None,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.transaction_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn group_id(&self) -> Option<AggregateId> {
        self.group_id
    }

    pub fn kind(&self) -> TransactionType {
        self.kind
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn payment_details(&self) -> &PaymentDetails {
        &self.payment_details
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn supersedes(&self) -> Option<TransactionId> {
        self.supersedes
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        self.failed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    /// Check that a new record for `(user, group, kind)` may retry this one.
    pub fn ensure_supersedable_by(
        &self,
        user_id: UserId,
        group_id: Option<AggregateId>,
        kind: TransactionType,
    ) -> DomainResult<()> {
        if self.status != TransactionStatus::Failed {
            return Err(DomainError::invalid_transition(format!(
                "only failed transactions can be retried (status: {})",
                self.status
            )));
        }
        if self.user_id != Some(user_id) || self.group_id != group_id || self.kind != kind {
            return Err(DomainError::validation(
                "retry must match the user, group and type of the failed transaction",
            ));
        }
        Ok(())
    }

    fn ensure_pending(&self, action: &str) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found("transaction"));
        }
        if self.status != TransactionStatus::Pending {
            return Err(DomainError::invalid_transition(format!(
                "cannot {action} a {} transaction",
                self.status
            )));
        }
        Ok(())
    }
}

impl AggregateRoot for Transaction {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordTransaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTransaction {
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub group_id: Option<AggregateId>,
    pub kind: TransactionType,
    pub amount: u64,
    pub payment_method: PaymentMethod,
    pub payment_details: PaymentDetails,
    pub metadata: serde_json::Value,
    pub description: Option<String>,
    /// External payment reference used for idempotency.
    pub reference: Option<String>,
    pub supersedes: Option<TransactionId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkCompleted {
    pub processor_reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkFailed {
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelTransaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransaction {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionCommand {
    Record(RecordTransaction),
    MarkCompleted(MarkCompleted),
    MarkFailed(MarkFailed),
    Cancel(CancelTransaction),
}

/// Event: TransactionRecorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecorded {
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub group_id: Option<AggregateId>,
    pub kind: TransactionType,
    pub amount: Amount,
    pub payment_method: PaymentMethod,
    pub payment_details: PaymentDetails,
    pub metadata: serde_json::Value,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub supersedes: Option<TransactionId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCompleted {
    pub transaction_id: TransactionId,
    pub processor_reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionFailed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFailed {
    pub transaction_id: TransactionId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionCancelled {
    pub transaction_id: TransactionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionEvent {
    Recorded(TransactionRecorded),
    Completed(TransactionCompleted),
    Failed(TransactionFailed),
    Cancelled(TransactionCancelled),
}

impl Event for TransactionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TransactionEvent::Recorded(_) => "transactions.transaction.recorded",
            TransactionEvent::Completed(_) => "transactions.transaction.completed",
            TransactionEvent::Failed(_) => "transactions.transaction.failed",
            TransactionEvent::Cancelled(_) => "transactions.transaction.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TransactionEvent::Recorded(e) => e.occurred_at,
            TransactionEvent::Completed(e) => e.occurred_at,
            TransactionEvent::Failed(e) => e.occurred_at,
            TransactionEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Transaction {
    type Command = TransactionCommand;
    type Event = TransactionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TransactionEvent::Recorded(e) => {
                self.transaction_id = Some(e.transaction_id);
                self.user_id = Some(e.user_id);
                self.group_id = e.group_id;
                self.kind = e.kind;
                self.amount = e.amount.get();
                self.status = TransactionStatus::Pending;
                self.payment_method = e.payment_method;
                self.payment_details = e.payment_details.clone();
                self.metadata = e.metadata.clone();
                self.description = e.description.clone();
                self.reference = e.reference.clone();
                self.supersedes = e.supersedes;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            TransactionEvent::Completed(e) => {
                self.status = TransactionStatus::Completed;
                self.completed_at = Some(e.occurred_at);
                if e.processor_reference.is_some() {
                    self.payment_details.processor_reference = e.processor_reference.clone();
                }
            }
            TransactionEvent::Failed(e) => {
                self.status = TransactionStatus::Failed;
                self.failed_at = Some(e.occurred_at);
                self.failure_reason = Some(e.reason.clone());
            }
            TransactionEvent::Cancelled(e) => {
                self.status = TransactionStatus::Cancelled;
                self.cancelled_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TransactionCommand::Record(cmd) => self.handle_record(cmd),
            TransactionCommand::MarkCompleted(cmd) => {
                self.ensure_pending("complete")?;
                Ok(vec![TransactionEvent::Completed(TransactionCompleted {
                    transaction_id: self.checked_id()?,
                    processor_reference: cmd.processor_reference.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            TransactionCommand::MarkFailed(cmd) => {
                self.ensure_pending("fail")?;
                Ok(vec![TransactionEvent::Failed(TransactionFailed {
                    transaction_id: self.checked_id()?,
                    reason: cmd.reason.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            TransactionCommand::Cancel(cmd) => {
                self.ensure_pending("cancel")?;
                Ok(vec![TransactionEvent::Cancelled(TransactionCancelled {
                    transaction_id: self.checked_id()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Transaction {
    fn checked_id(&self) -> DomainResult<TransactionId> {
        self.transaction_id
            .ok_or_else(|| DomainError::invariant("recorded transaction without id"))
    }

    fn handle_record(&self, cmd: &RecordTransaction) -> Result<Vec<TransactionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "transaction {} already recorded",
                cmd.transaction_id
            )));
        }
        if cmd.transaction_id.aggregate_id() != self.id {
            return Err(DomainError::invariant("transaction id does not match stream"));
        }
        let amount = Amount::new(cmd.amount)?;

        let description = cmd
            .description
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        if let Some(d) = &description {
            if d.chars().count() > DESCRIPTION_MAX_CHARS {
                return Err(DomainError::validation(format!(
                    "description cannot exceed {DESCRIPTION_MAX_CHARS} characters"
                )));
            }
        }
        cmd.payment_details.validate()?;
        if cmd.supersedes == Some(cmd.transaction_id) {
            return Err(DomainError::validation("a transaction cannot supersede itself"));
        }

        Ok(vec![TransactionEvent::Recorded(TransactionRecorded {
            transaction_id: cmd.transaction_id,
            user_id: cmd.user_id,
            group_id: cmd.group_id,
            kind: cmd.kind,
            amount,
            payment_method: cmd.payment_method,
            payment_details: cmd.payment_details.clone(),
            metadata: cmd.metadata.clone(),
            description,
            reference: cmd.reference.clone(),
            supersedes: cmd.supersedes,
            occurred_at: cmd.occurred_at,
        })])
    }
}
