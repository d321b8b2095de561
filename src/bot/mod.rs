//! Bot module for handling Telegram interactions
//!
//! This module is split into several submodules:
//! - `routing`: Pure decisions about commands, menu buttons and callback payloads
//! - `message_handler`: Handles incoming text and non-text messages
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `ui_builder`: Creates keyboards and formats messages
//! - `dialogue_manager`: Runs the consultation booking steps

pub mod callback_handler;
pub mod dialogue_manager;
pub mod message_handler;
pub mod routing;
pub mod ui_builder;

use sqlx::postgres::PgPool;
use teloxide::types::User;

use crate::config::{ClinicInfo, Settings};
use crate::db::UserProfile;
use crate::responder::ResponseGenerator;
use crate::site_content::SiteContentCache;
use crate::transport::RetryPolicy;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;
pub use routing::{route_text, CallbackAction, Command, MenuAction, Route};

/// Shared state injected into every handler
pub struct BotContext {
    pub pool: PgPool,
    pub clinic: ClinicInfo,
    pub admin_chat_id: Option<i64>,
    pub responder: ResponseGenerator,
    pub site_content: Option<SiteContentCache>,
    pub retry: RetryPolicy,
    pub bot_username: Option<String>,
}

impl BotContext {
    pub fn new(pool: PgPool, settings: &Settings, responder: ResponseGenerator) -> Self {
        Self {
            pool,
            clinic: settings.clinic.clone(),
            admin_chat_id: settings.admin_chat_id,
            responder,
            site_content: None,
            retry: RetryPolicy::from(&settings.recovery),
            bot_username: None,
        }
    }

    pub fn with_site_content(mut self, cache: SiteContentCache) -> Self {
        self.site_content = Some(cache);
        self
    }

    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    /// Whether a Telegram user may change request statuses
    pub fn is_admin(&self, user: &User) -> bool {
        self.admin_chat_id == Some(user.id.0 as i64)
    }
}

/// Profile fields stored for a Telegram user
pub fn user_profile(user: &User) -> UserProfile {
    UserProfile {
        telegram_id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|name| !name.is_empty()),
        last_name: user.last_name.clone(),
    }
}
