//! Client model for the client store.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Customer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: i64,
    pub identity_id: String,
    pub rtn: Option<String>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub city: Option<String>,
}

/// Input for creating a client.
#[derive(Debug, Clone, Validate)]
pub struct CreateClient {
    #[validate(length(min = 1, message = "Identity id cannot be empty"))]
    pub identity_id: String,
    #[validate(length(min = 1, message = "RTN cannot be empty when given"))]
    pub rtn: Option<String>,
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: String,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub city: Option<String>,
}

/// Input for updating a client. `None` keeps the stored value.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateClient {
    #[validate(length(min = 1, message = "Identity id cannot be empty"))]
    pub identity_id: Option<String>,
    #[validate(length(min = 1, message = "RTN cannot be empty when given"))]
    pub rtn: Option<String>,
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSearch {
    Name(String),
    IdentityId(String),
    Id(i64),
}

/// Result of deleting a client. Invoices keep their name snapshot, so a
/// client with invoices on record is removed after a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientDeletion {
    pub client_id: i64,
    pub invoices_on_record: i64,
}
