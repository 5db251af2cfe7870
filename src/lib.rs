//! Core session and dashboard engine for the Zappies mobile console.
//!
//! This crate carries the non-UI half of the app: the authentication
//! session lifecycle (sign-up, sign-in, sign-out, profile management,
//! first-run gating) and the dashboard aggregation pipeline that fans
//! out across a user's businesses and reduces the results into a single
//! immutable [`DashboardSnapshot`].
//!
//! # Architecture
//!
//! - [`backend`] — the [`BackendClient`] trait every data source implements
//! - [`supabase`] — HTTP implementation over a Supabase project
//! - [`memory`] — in-process implementation with failure injection, for
//!   tests and offline fixtures
//! - [`session`] — [`SessionManager`], the auth state machine
//! - [`dashboard`] — [`DashboardAggregator`], the concurrent fan-out
//! - [`metrics`] — [`MetricsComputer`], the pure derivation layer
//! - [`store`] — persisted device-local flags such as onboarding state

pub mod backend;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod schema;
pub mod session;
pub mod store;
pub mod supabase;
pub mod validation;

pub use backend::{BackendClient, ChangeFilter};
pub use config::AppConfig;
pub use dashboard::DashboardAggregator;
pub use error::{AuthError, Result, ZappiesError};
pub use memory::{Fixture, MemoryBackend};
pub use metrics::MetricsComputer;
pub use models::{
    AuthChange, AuthEventKind, Bot, BotStatus, Business, ChangeEvent, Conversation,
    DashboardSnapshot, ProfilePatch, ProfileSeed, Session, TimeWindow, UserProfile,
};
pub use session::{AuthPhase, SessionManager, SessionState};
pub use store::{FlagStore, MemoryFlagStore, SledFlagStore};
pub use supabase::SupabaseBackend;
pub use validation::InputValidator;
