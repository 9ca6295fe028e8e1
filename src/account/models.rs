//! Account record, role and the public projection returned by login.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Agent,
    #[default]
    Customer,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Agent => "agent",
            Self::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "agent" => Ok(Self::Agent),
            "customer" => Ok(Self::Customer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub region: String,
    pub city: String,
    pub street: String,
    pub state: String,
    pub pincode: String,
}

/// A stored account as read from the datastore.
///
/// Not serializable on purpose: responses are built from [`PublicAccount`].
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: SecretString,
    pub role: Role,
    pub address: Address,
    pub location: Option<String>,
    pub phone: String,
    pub alternate_phone: Option<String>,
    pub verified: bool,
    pub joined_on: DateTime<Utc>,
    pub manufacturer_id: i32,
    pub wholesaler_id: i32,
    pub gst_no: String,
    pub blocked: bool,
    pub brand_name: String,
    pub shop_name: String,
    pub vehicle_number: Option<String>,
    pub sales_region: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

/// Whitelisted account fields safe to hand to the client after login.
///
/// Id, role, hash, timestamps and version have no field here, so they cannot
/// leak through serialization.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicAccount {
    pub username: String,
    pub email: String,
    pub address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_phone: Option<String>,
    pub verified: bool,
    pub joined_on: DateTime<Utc>,
    pub manufacturer_id: i32,
    pub wholesaler_id: i32,
    #[serde(rename = "GSTno")]
    pub gst_no: String,
    pub blocked: bool,
    pub brand_name: String,
    pub shop_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_number: Option<String>,
    pub sales_region: Vec<String>,
}

impl From<&AccountRecord> for PublicAccount {
    fn from(record: &AccountRecord) -> Self {
        Self {
            username: record.username.clone(),
            email: record.email.clone(),
            address: record.address.clone(),
            location: record.location.clone(),
            phone: record.phone.clone(),
            alternate_phone: record.alternate_phone.clone(),
            verified: record.verified,
            joined_on: record.joined_on,
            manufacturer_id: record.manufacturer_id,
            wholesaler_id: record.wholesaler_id,
            gst_no: record.gst_no.clone(),
            blocked: record.blocked,
            brand_name: record.brand_name.clone(),
            shop_name: record.shop_name.clone(),
            vehicle_number: record.vehicle_number.clone(),
            sales_region: record.sales_region.clone(),
        }
    }
}
