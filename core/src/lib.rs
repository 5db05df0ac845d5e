//! Conversation orchestration for the healthmate assistant.
//!
//! Inbound chat events enter through [`dispatcher::Dispatcher`], which applies the
//! per-user [`rate_limit::RateLimiter`], serializes events per user, and routes them
//! into the dialogue flows under [`flows`]. Flows reach the outside world only through
//! the collaborator traits in [`collaborators`], wrapped by [`resilience`].

pub mod auth;
pub mod callback;
pub mod collaborators;
pub mod config;
pub mod confirmation;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod events;
pub mod flows;
pub mod jobs;
pub mod nutrition;
pub mod prompts;
pub mod rate_limit;
pub mod report;
pub mod resilience;
pub mod scheduler;
pub mod session;
pub mod validate;

#[cfg(test)]
mod testing;

/// Chat-platform user identity.
pub type UserId = i64;
/// Chat the bot answers in. Equal to the user id in private chats.
pub type ChatId = i64;
/// Message id inside a chat, used for edits.
pub type MessageId = i64;
