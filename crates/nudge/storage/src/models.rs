//! Database models.

use diesel::prelude::*;

use crate::schema::{accounts, devices};

/// Account record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = accounts, primary_key(identifier))]
pub struct AccountRow {
    pub identifier: String,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

/// New account for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = accounts)]
pub struct NewAccount<'a> {
    pub identifier: &'a str,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

/// Device registration record.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = devices, primary_key(account_identifier, device_id))]
pub struct DeviceRow {
    pub account_identifier: String,
    pub device_id: i64,
    pub push_token: Option<String>,
    pub last_push_timestamp: i64,
}

/// New device registration for insertion.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = devices)]
pub struct NewDevice<'a> {
    pub account_identifier: &'a str,
    pub device_id: i64,
    pub push_token: Option<&'a str>,
    pub last_push_timestamp: i64,
}
