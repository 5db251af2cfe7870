//! Backend table definitions
//!
//! This module provides constants for the remote table and filter-column
//! names used when building PostgREST queries and realtime subscriptions.

/// User profiles table schema
pub mod users {
    /// Table name
    pub const TABLE: &str = "users";
    /// Primary key column, equal to the auth user id
    pub const ID: &str = "id";
}

/// Businesses table schema
pub mod businesses {
    /// Table name
    pub const TABLE: &str = "businesses";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning user foreign key column
    pub const USER_ID: &str = "user_id";
}

/// Bots table schema
pub mod bots {
    /// Table name
    pub const TABLE: &str = "bots";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning business foreign key column
    pub const BUSINESS_ID: &str = "business_id";
}

/// Conversations table schema
pub mod conversations {
    /// Table name
    pub const TABLE: &str = "conversations";
    /// Primary key column
    pub const ID: &str = "id";
    /// Handling bot foreign key column
    pub const BOT_ID: &str = "bot_id";
    /// Latest activity timestamp column
    pub const UPDATED_AT: &str = "updated_at";
}

/// Messages table schema (consumed by conversation views, not the core)
pub mod messages {
    /// Table name
    pub const TABLE: &str = "messages";
    /// Owning conversation foreign key column
    pub const CONVERSATION_ID: &str = "conversation_id";
}

/// Message templates table schema
pub mod templates {
    /// Table name
    pub const TABLE: &str = "templates";
    /// Owning bot foreign key column
    pub const BOT_ID: &str = "bot_id";
}

/// Analytics events table schema
pub mod analytics {
    /// Table name
    pub const TABLE: &str = "analytics";
    /// Emitting bot foreign key column
    pub const BOT_ID: &str = "bot_id";
    /// Event timestamp column
    pub const CREATED_AT: &str = "created_at";
}

/// Leads table schema
pub mod leads {
    /// Table name
    pub const TABLE: &str = "leads";
    /// Owning bot foreign key column
    pub const BOT_ID: &str = "bot_id";
}
