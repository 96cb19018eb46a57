//! Repository layer
//!
//! Thin, per-entity query modules over the SeaORM models. The
//! [`crate::store::PgMessageStore`] stitches these into the core store
//! trait; nothing above the store should reach for a repository directly.

pub mod business_account;
pub mod campaign;
pub mod contact;
pub mod conversation;
pub mod message;

pub use business_account::BusinessAccountRepository;
pub use campaign::CampaignRepository;
pub use contact::ContactRepository;
pub use conversation::ConversationRepository;
pub use message::MessageRepository;
