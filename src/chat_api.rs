//! The authenticated chat endpoints.
//!
//! [`ChatApi`] is the seam between the chat session controller and the network: the
//! [`Palaver`] client implements it over HTTP, and tests substitute scripted fakes.

use std::sync::Arc;

use crate::client::{Operation, Palaver};
use crate::error::Result;
use crate::types::{ChatMessageParam, ChatTurn};

/// Authenticated access to the chat transcript.
#[async_trait::async_trait]
pub trait ChatApi: Send + Sync {
    /// Fetch every turn the server holds for the current user, oldest first.
    ///
    /// Fails with [`Error::AuthRequired`](crate::Error::AuthRequired) when no token is stored
    /// and [`Error::SessionExpired`](crate::Error::SessionExpired) when the server rejects it.
    async fn fetch_history(&self) -> Result<Vec<ChatTurn>>;

    /// Send `text` and return the turn the server created for it.
    ///
    /// Same authentication failures as [`ChatApi::fetch_history`].  Never retried.
    async fn send_message(&self, text: &str) -> Result<ChatTurn>;
}

#[async_trait::async_trait]
impl<A: ChatApi + ?Sized> ChatApi for Arc<A> {
    async fn fetch_history(&self) -> Result<Vec<ChatTurn>> {
        (**self).fetch_history().await
    }

    async fn send_message(&self, text: &str) -> Result<ChatTurn> {
        (**self).send_message(text).await
    }
}

#[async_trait::async_trait]
impl ChatApi for Palaver {
    async fn fetch_history(&self) -> Result<Vec<ChatTurn>> {
        let token = self.require_token()?;
        let url = self.endpoint(&self.routes().history)?;
        let request = self.http().get(url).bearer_auth(token.as_str());
        let response = self.execute(Operation::FetchHistory, request).await?;
        let turns: Vec<ChatTurn> = self.parse_json(Operation::FetchHistory, response).await?;
        if let Some(logger) = self.logger() {
            logger.log_history(&turns);
        }
        Ok(turns)
    }

    async fn send_message(&self, text: &str) -> Result<ChatTurn> {
        let token = self.require_token()?;
        let url = self.endpoint(&self.routes().send)?;
        let request = self
            .http()
            .post(url)
            .bearer_auth(token.as_str())
            .json(&ChatMessageParam::new(text));
        let response = self.execute(Operation::SendMessage, request).await?;
        let turn: ChatTurn = self.parse_json(Operation::SendMessage, response).await?;
        if let Some(logger) = self.logger() {
            logger.log_turn(&turn);
        }
        Ok(turn)
    }
}
