//! Outgoing chat transport
//!
//! The bot never talks to a chat network directly. Everything it says goes
//! through a [`Tunnel`], which a host implements for IRC, Discord, a test
//! recorder or anything else that can deliver text.

use async_trait::async_trait;

use crate::participant::Identity;

/// Trait for sending text to the chat the bot serves
///
/// Implementations should report delivery failures rather than panic; the
/// bot logs them and carries on with the quiz.
#[async_trait]
pub trait Tunnel: Send + Sync {
    /// Sends `text` to the public channel
    ///
    /// # Errors
    ///
    /// Returns `crate::Error::Transport` if the message could not be
    /// delivered.
    async fn send(&self, text: &str) -> Result<(), crate::Error>;

    /// Sends `text` privately to `user`
    ///
    /// # Errors
    ///
    /// Returns `crate::Error::Transport` if the message could not be
    /// delivered.
    async fn send_private(&self, user: &Identity, text: &str) -> Result<(), crate::Error>;
}
