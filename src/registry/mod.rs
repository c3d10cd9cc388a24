mod memory;
#[cfg(test)]
mod tests;

pub use memory::InMemoryRegistry;

use crate::code::Code;
use crate::error::RegistryError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Canceled,
}

/// An order as stored by the registry. This crate only reads it, apart from
/// the explicit serve confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    #[serde(default)]
    pub short_code: Option<String>,
    pub status: OrderStatus,
    pub consumption_date: NaiveDate,
    pub dish_ref: String,
    pub holder_ref: String,
}

/// Whether a found order can be handed over right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eligibility", rename_all = "snake_case")]
pub enum Eligibility {
    Ready,
    AlreadyServed,
    Canceled,
    WrongDay { consumption_date: NaiveDate },
}

impl Eligibility {
    pub fn is_ready(&self) -> bool {
        matches!(self, Eligibility::Ready)
    }

    pub fn describe(&self) -> String {
        match self {
            Eligibility::Ready => "ready to serve".to_string(),
            Eligibility::AlreadyServed => "already served".to_string(),
            Eligibility::Canceled => "order canceled".to_string(),
            Eligibility::WrongDay { consumption_date } => {
                format!("order is for {}", consumption_date)
            }
        }
    }
}

impl OrderRecord {
    /// Whether this record is the one a classified code refers to
    pub fn matches(&self, code: &Code) -> bool {
        match code {
            Code::ShortCode(short) => self
                .short_code
                .as_deref()
                .map(|own| own.eq_ignore_ascii_case(short))
                .unwrap_or(false),
            Code::LongIdentifier(id) => self.id.eq_ignore_ascii_case(id),
        }
    }

    pub fn eligibility(&self, today: NaiveDate) -> Eligibility {
        match self.status {
            OrderStatus::Canceled => Eligibility::Canceled,
            OrderStatus::Confirmed => Eligibility::AlreadyServed,
            OrderStatus::Pending if self.consumption_date != today => Eligibility::WrongDay {
                consumption_date: self.consumption_date,
            },
            OrderStatus::Pending => Eligibility::Ready,
        }
    }
}

/// The authoritative store of orders.
///
/// `lookup` never changes anything; `mark_served` is the only mutation and is
/// only ever invoked by an explicit operator confirmation.
#[async_trait::async_trait]
pub trait OrderRegistry: Send + Sync {
    async fn lookup(&self, code: &Code) -> Result<Option<OrderRecord>, RegistryError>;

    async fn mark_served(&self, order_id: &str) -> Result<OrderRecord, RegistryError>;
}
