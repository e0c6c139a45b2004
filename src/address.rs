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

//! Validation of the bracketed paths given to `MAIL FROM:` and `RCPT TO:`.
//!
//! See [`parse_path`].

use thiserror::Error;

use crate::str::max_lengths;

/// The shortest path that could hold an address: a single character between angle brackets.
pub const MIN_LEN: usize = 3;

/// Validate a path such as `<smith@example.com>` and return the bare address inside it.
///
/// `raw` is what follows the `FROM:` or `TO:` prefix, with leading spaces and the line ending
/// already removed. Trailing whitespace after the closing `>` is tolerated, anything else after
/// it is taken to be an unsupported mail parameter.
///
/// Only the shape of the path is checked here. Whether a recipient exists is up to the
/// [`MailStore`](crate::store::MailStore).
///
/// # Errors
///
/// Returns an [`AddressError`] describing the first rule the path breaks.
pub fn parse_path(raw: &str) -> Result<String, AddressError> {
    if raw.len() < MIN_LEN {
        return Err(AddressError::TooShort);
    }

    let (Some(open), Some(close)) = (raw.find('<'), raw.find('>')) else {
        return Err(AddressError::MissingBrackets);
    };

    let trailing = &raw[close + 1..];
    if !trailing.trim().is_empty() {
        // RFC 5321 section 4.1.2 separates `Mail-parameters` from the path with a space.
        if trailing.starts_with(|c: char| c.is_ascii_whitespace()) {
            return Err(AddressError::ParametersNotImplemented);
        }

        return Err(AddressError::Malformed);
    }

    if open != 0 {
        return Err(AddressError::Malformed);
    }

    let address = &raw[1..close];
    if address.is_empty() || address.contains(['<', '>']) {
        return Err(AddressError::Malformed);
    }

    if close + 1 > max_lengths::PATH {
        return Err(AddressError::TooLong);
    }

    if let Some((local_part, domain)) = address.rsplit_once('@') {
        if local_part.len() > max_lengths::LOCAL_PART || domain.len() > max_lengths::DOMAIN {
            return Err(AddressError::TooLong);
        }
    }

    Ok(address.to_owned())
}

/// Reasons a path given to `MAIL` or `RCPT` is rejected.
#[derive(Error, PartialEq, Eq, Debug, Copy, Clone)]
pub enum AddressError {
    #[error("Syntax error - address too short")]
    TooShort,
    #[error("Syntax error - address too long")]
    TooLong,
    #[error("Syntax error in address")]
    MissingBrackets,
    #[error("Mail parameters not implemented")]
    ParametersNotImplemented,
    #[error("Syntax error in address")]
    Malformed,
}
