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

//! A [`MailStore`] that keeps everything in memory.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use super::{MailItem, MailStore, Mailbox, StoreError};

/// Users and their messages, held in memory for the life of the process.
///
/// Users are looked up by their exact name, so an SMTP recipient must be registered under the
/// full address it is sent to (such as `bob@example.com`) to receive mail.
#[derive(Default, Debug)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<String, Account>>,
    next_id: AtomicU64,
}

#[derive(Debug)]
struct Account {
    password: String,
    messages: Vec<StoredMessage>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    /// Identifies the message across sessions, as positions shift when others are removed.
    id: u64,
    body: Arc<[u8]>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user, or change the password of an existing one.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if another thread panicked while holding the store.
    pub fn add_user(
        &self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<(), StoreError> {
        let password = password.into();

        self.accounts()?
            .entry(username.into())
            .and_modify(|account| account.password.clone_from(&password))
            .or_insert_with(|| Account {
                password,
                messages: Vec::new(),
            });

        Ok(())
    }

    /// Get a copy of every message stored for `username`, in order.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoSuchUser`], or [`StoreError::Unavailable`] if another thread panicked
    /// while holding the store.
    pub fn messages(&self, username: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self
            .accounts()?
            .get(username)
            .ok_or(StoreError::NoSuchUser)?
            .messages
            .iter()
            .map(|message| message.body.to_vec())
            .collect())
    }

    fn accounts(&self) -> Result<MutexGuard<'_, HashMap<String, Account>>, StoreError> {
        self.accounts
            .lock()
            .map_err(|_| StoreError::Unavailable("account table poisoned".to_owned()))
    }
}

impl MailStore for MemoryStore {
    type Mailbox = MemoryMailbox;

    fn validate_credentials(&self, username: &str, password: Option<&str>) -> bool {
        self.accounts().is_ok_and(|accounts| {
            accounts.get(username).is_some_and(|account| {
                password.is_none_or(|given| given == account.password)
            })
        })
    }

    fn load_mailbox(&self, username: &str) -> Result<Self::Mailbox, StoreError> {
        let messages = self
            .accounts()?
            .get(username)
            .ok_or(StoreError::NoSuchUser)?
            .messages
            .clone();

        let total: u64 = messages
            .iter()
            .map(|message| message.body.len() as u64)
            .sum();
        if u32::try_from(messages.len()).is_err() || u32::try_from(total).is_err() {
            return Err(StoreError::MailboxTooLarge);
        }

        Ok(MemoryMailbox {
            username: username.to_owned(),
            deleted: vec![false; messages.len()],
            messages,
        })
    }

    fn release_mailbox(&self, mailbox: Self::Mailbox) -> Result<(), StoreError> {
        let removed: Vec<u64> = mailbox
            .messages
            .iter()
            .zip(&mailbox.deleted)
            .filter(|(_, deleted)| **deleted)
            .map(|(message, _)| message.id)
            .collect();

        if removed.is_empty() {
            return Ok(());
        }

        self.accounts()?
            .get_mut(&mailbox.username)
            .ok_or(StoreError::NoSuchUser)?
            .messages
            .retain(|message| !removed.contains(&message.id));

        Ok(())
    }

    fn deliver_to(&self, recipient: &str, message: &[u8]) -> Result<(), StoreError> {
        if u32::try_from(message.len()).is_err() {
            return Err(StoreError::MessageTooLarge);
        }

        self.accounts()?
            .get_mut(recipient)
            .ok_or(StoreError::NoSuchUser)?
            .messages
            .push(StoredMessage {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                body: Arc::from(message),
            });

        Ok(())
    }
}

/// A snapshot of a user's messages taken when their mailbox was opened.
///
/// Mail delivered while the mailbox is open shows up the next time it is opened.
#[derive(Debug)]
pub struct MemoryMailbox {
    username: String,
    messages: Vec<StoredMessage>,
    deleted: Vec<bool>,
}

impl MemoryMailbox {
    fn position(&self, index: u32) -> Option<usize> {
        usize::try_from(index)
            .ok()
            .filter(|&index| index < self.messages.len())
    }
}

impl Mailbox for MemoryMailbox {
    fn slots(&self) -> u32 {
        // `load_mailbox` refuses mailboxes with more messages than this.
        u32::try_from(self.messages.len()).unwrap_or(u32::MAX)
    }

    fn message(&self, index: u32) -> Option<MailItem> {
        let position = self.position(index)?;

        let body = &self.messages[position].body;

        Some(MailItem {
            index: index.saturating_add(1),
            size: u32::try_from(body.len()).unwrap_or(u32::MAX),
            deleted: self.deleted[position],
        })
    }

    fn body(&self, index: u32) -> Result<Vec<u8>, StoreError> {
        let position = self.position(index).ok_or(StoreError::NoSuchMessage)?;

        Ok(self.messages[position].body.to_vec())
    }

    fn mark_deleted(&mut self, index: u32) -> bool {
        let Some(position) = self.position(index) else {
            return false;
        };

        self.deleted[position] = true;
        true
    }

    fn reset_deletions(&mut self) {
        self.deleted.fill(false);
    }
}
