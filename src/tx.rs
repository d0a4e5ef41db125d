use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Represents a value transfer between two addresses.
///
/// Immutable once built: fields are only reachable through accessors.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    /// The sender's address.
    sender: String,
    /// The recipient's address.
    recipient: String,
    /// The amount to transfer.
    amount: f64,
    /// Creation time in unix milliseconds.
    timestamp: i64,
    /// Placeholder authenticity tag derived from the sender.
    /// Not a cryptographic signature and never verified.
    signature: String,
}

impl Transaction {
    /// Creates a transaction stamped with the current time.
    ///
    /// Neither the amount nor the addresses are validated.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self::with_timestamp(sender, recipient, amount, Utc::now().timestamp_millis())
    }

    pub fn with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
        timestamp: i64,
    ) -> Self {
        let sender = sender.into();
        let signature = format!("signed_by_{}", sender);
        Self {
            sender,
            recipient: recipient.into(),
            amount,
            timestamp,
            signature,
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The canonical field mapping used for block hashing.
    /// Keys are listed in lexicographic order.
    pub fn to_record(&self) -> Value {
        json!({
            "amount": self.amount,
            "recipient": self.recipient,
            "sender": self.sender,
            "signature": self.signature,
            "timestamp": self.timestamp,
        })
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.sender, self.recipient, self.amount)
    }
}
