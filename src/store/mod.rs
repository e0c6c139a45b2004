// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright © 2024 RemasteredArch
//
// This file is part of mail_gateway.
//
// mail_gateway is free software: you can redistribute it and/or modify it under the terms of the
// GNU Affero General Public License as published by the Free Software Foundation, either version
// 3 of the License, or (at your option) any later version.
//
// mail_gateway is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See
// the GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License along with
// mail_gateway. If not, see <https://www.gnu.org/licenses/>.

//! The mail store that sessions read mailboxes from and deliver messages into.
//!
//! Stores are shared by every session of a server, so implementations take `&self` and handle
//! their own synchronisation. See [`MemoryStore`] for an in-memory implementation.

mod memory;

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use log::error;
use thiserror::Error;

pub use memory::{MemoryMailbox, MemoryStore};

/// A read-only view of one message in a [`Mailbox`].
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct MailItem {
    /// The 1-based position of the message, as used on the wire.
    pub index: u32,
    /// The length of the message in bytes.
    pub size: u32,
    /// Whether the message is marked for deletion in the current session.
    pub deleted: bool,
}

/// One user's messages, held open by a POP3 session.
///
/// Positions are 0-based here; the session engine converts from the 1-based numbers clients
/// use. A deleted message keeps its position until the mailbox is released.
///
/// Counts and sizes are bounded to `u32`. A store must refuse to open a mailbox that doesn't fit.
pub trait Mailbox: Send {
    /// The number of message positions, including deleted messages.
    fn slots(&self) -> u32;

    /// Get the message at 0-based `index`, or `None` if there is no such position.
    fn message(&self, index: u32) -> Option<MailItem>;

    /// Read the full contents of the message at 0-based `index`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoSuchMessage`] for an unknown position, or whatever the backing storage
    /// fails with.
    fn body(&self, index: u32) -> Result<Vec<u8>, StoreError>;

    /// Mark the message at 0-based `index` as deleted. Returns `false` if there is no such
    /// position.
    fn mark_deleted(&mut self, index: u32) -> bool;

    /// Clear every deletion mark.
    fn reset_deletions(&mut self);

    /// Every message that isn't marked as deleted, in order.
    fn live_messages(&self) -> impl Iterator<Item = MailItem> + '_ {
        (0..self.slots())
            .filter_map(|index| self.message(index))
            .filter(|item| !item.deleted)
    }

    /// The number of messages that aren't marked as deleted.
    fn message_count(&self) -> u32 {
        self.live_messages()
            .fold(0, |count, _| count.saturating_add(1))
    }

    /// The total size in bytes of the messages that aren't marked as deleted.
    fn total_octets(&self) -> u32 {
        self.live_messages()
            .fold(0, |total: u32, item| total.saturating_add(item.size))
    }
}

/// Credentials, mailboxes and delivery for a set of users.
pub trait MailStore: Send + Sync + 'static {
    type Mailbox: Mailbox;

    /// Check a username and password. With `password` as `None`, only checks that the user
    /// exists.
    fn validate_credentials(&self, username: &str, password: Option<&str>) -> bool;

    /// Check whether `address` (without angle brackets) can receive mail here.
    fn is_known_recipient(&self, address: &str) -> bool {
        self.validate_credentials(address, None)
    }

    /// Open the mailbox of `username`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoSuchUser`], [`StoreError::MailboxTooLarge`] if it cannot be described with
    /// `u32` counts, or whatever the backing storage fails with.
    fn load_mailbox(&self, username: &str) -> Result<Self::Mailbox, StoreError>;

    /// Close a mailbox, permanently removing every message still marked as deleted.
    ///
    /// # Errors
    ///
    /// Whatever the backing storage fails with.
    fn release_mailbox(&self, mailbox: Self::Mailbox) -> Result<(), StoreError>;

    /// Store one copy of `message` in the mailbox of `recipient`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoSuchUser`], [`StoreError::MessageTooLarge`], or whatever the backing
    /// storage fails with.
    fn deliver_to(&self, recipient: &str, message: &[u8]) -> Result<(), StoreError>;

    /// Store one copy of `message` per entry of `recipients`, duplicates included.
    ///
    /// # Errors
    ///
    /// The first error from [`Self::deliver_to`]. Copies stored before it are kept.
    fn deliver_message(&self, message: &[u8], recipients: &[String]) -> Result<(), StoreError> {
        recipients
            .iter()
            .try_for_each(|recipient| self.deliver_to(recipient, message))
    }
}

/// Errors reported by a [`MailStore`] or [`Mailbox`].
#[derive(Error, PartialEq, Eq, Debug, Clone)]
pub enum StoreError {
    #[error("no such user")]
    NoSuchUser,
    #[error("no such message")]
    NoSuchMessage,
    #[error("mailbox too large")]
    MailboxTooLarge,
    #[error("message too large")]
    MessageTooLarge,
    #[error("mail store unavailable: {0}")]
    Unavailable(String),
}

/// An open [`Mailbox`] that is released back to its store exactly once.
///
/// [`Self::commit`] releases it with deletions applied. Dropping the handle instead (on
/// disconnect, timeout or an I/O error) clears every deletion mark first, so nothing is removed.
pub struct MailboxHandle<S: MailStore> {
    store: Arc<S>,
    /// Only `None` once [`Self::commit`] has taken it, which consumes the handle.
    mailbox: Option<S::Mailbox>,
}

impl<S: MailStore> MailboxHandle<S> {
    /// Open the mailbox of `username` in `store`.
    ///
    /// # Errors
    ///
    /// Whatever [`MailStore::load_mailbox`] returns.
    pub fn open(store: &Arc<S>, username: &str) -> Result<Self, StoreError> {
        let mailbox = store.load_mailbox(username)?;

        Ok(Self {
            store: Arc::clone(store),
            mailbox: Some(mailbox),
        })
    }

    /// Release the mailbox, permanently removing messages marked as deleted.
    ///
    /// # Errors
    ///
    /// Whatever [`MailStore::release_mailbox`] returns.
    pub fn commit(mut self) -> Result<(), StoreError> {
        self.mailbox
            .take()
            .map_or(Ok(()), |mailbox| self.store.release_mailbox(mailbox))
    }
}

impl<S: MailStore> Deref for MailboxHandle<S> {
    type Target = S::Mailbox;

    fn deref(&self) -> &Self::Target {
        self.mailbox
            .as_ref()
            .expect("the mailbox is held until the handle is consumed")
    }
}

impl<S: MailStore> DerefMut for MailboxHandle<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.mailbox
            .as_mut()
            .expect("the mailbox is held until the handle is consumed")
    }
}

impl<S: MailStore> Drop for MailboxHandle<S> {
    fn drop(&mut self) {
        if let Some(mut mailbox) = self.mailbox.take() {
            mailbox.reset_deletions();

            if let Err(err) = self.store.release_mailbox(mailbox) {
                error!("Failed to release mailbox: {err}");
            }
        }
    }
}
