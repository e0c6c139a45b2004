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

//! Text included at the start of every log statement a session makes.

use std::{fmt::Display, mem};

/// Identifies a session in the log, such as `pop3[127.0.0.1:50000 bob]`.
///
/// Client-supplied parts are sanitised before they are stored.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct LogPrefix {
    protocol: &'static str,
    peer: Option<String>,
    user: Option<String>,
    helo: Option<String>,
}

impl LogPrefix {
    #[must_use]
    pub const fn new(protocol: &'static str) -> Self {
        Self {
            protocol,
            peer: None,
            user: None,
            helo: None,
        }
    }

    #[must_use]
    pub fn with_peer(mut self, peer: impl Display) -> Self {
        self.peer = Some(peer.to_string());
        self
    }

    pub fn set_user(&mut self, user: &str) {
        self.user = Some(sanitise(user));
    }

    pub fn set_helo(&mut self, helo: &str) {
        self.helo = Some(sanitise(helo));
    }
}

impl Display for LogPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.protocol)?;

        if self.peer.is_none() && self.user.is_none() && self.helo.is_none() {
            return Ok(());
        }

        f.write_str("[")?;
        let mut first = true;

        if let Some(peer) = &self.peer {
            f.write_str(peer)?;
            first = false;
        }

        if let Some(user) = &self.user {
            if !mem::take(&mut first) {
                f.write_str(" ")?;
            }
            f.write_str(user)?;
        }

        if let Some(helo) = &self.helo {
            if !mem::take(&mut first) {
                f.write_str(" ")?;
            }
            write!(f, "helo={helo}")?;
        }

        f.write_str("]")
    }
}

fn sanitise(s: &str) -> String {
    let mut s: String = s.chars().filter(|c| !c.is_control()).collect();
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}
