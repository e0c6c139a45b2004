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

//! Errors that end a session early.
//!
//! Protocol mistakes by the client never show up here. They are answered with a reply and the
//! session carries on.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Reading from or writing to the connection failed for a reason other than the client
    /// closing it.
    #[error(transparent)]
    Io(#[from] io::Error),
}
