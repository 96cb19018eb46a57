//! SeaORM entity models
//!
//! One model per persisted entity. Status-like columns are stored as
//! strings; the core crate owns the enums and each model converts into its
//! core record via `TryFrom`.

pub mod business_account;
pub mod campaign;
pub mod campaign_list;
pub mod contact;
pub mod contact_list;
pub mod contact_list_membership;
pub mod conversation;
pub mod message;
pub mod organization;
