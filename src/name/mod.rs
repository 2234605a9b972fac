// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Validated, normalized domain names.
//!
//! A [`Name`] is the textual form of a domain name as it is used
//! throughout this crate: in request paths, in record keys, and (for
//! zones) as the stem of a file name. Parsing normalizes the name so
//! that two spellings of the same name compare equal:
//!
//! * ASCII letters are lowercased;
//! * a single trailing dot (the root label) is removed.
//!
//! Labels are restricted to ASCII letters, digits, hyphens, and
//! underscores. This is stricter than what the DNS itself allows, but
//! it guarantees that a zone name is always a safe file name (it can
//! never contain a `/`, nor be `.` or `..`).

use std::fmt;
use std::str::FromStr;

mod error;
pub use error::Error;

/// The maximum length of a single label, in octets.
pub const MAX_LABEL_LEN: usize = 63;

/// The maximum length of a name in text form (without the trailing
/// dot), in octets.
pub const MAX_NAME_LEN: usize = 253;

/// A validated, normalized domain name. See the
/// [module-level documentation](self) for the normalization rules.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Name(Box<str>);

impl Name {
    /// Returns the name as a string slice, without a trailing dot.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns an iterator over the labels of the name, from left to
    /// right.
    pub fn labels(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.split('.')
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() {
            return Err(Error::StrNotAscii);
        }
        let s = s.strip_suffix('.').unwrap_or(s);
        if s.is_empty() {
            return Err(Error::StrEmpty);
        } else if s.len() > MAX_NAME_LEN {
            return Err(Error::NameTooLong);
        }

        for label in s.split('.') {
            if label.is_empty() {
                return Err(Error::EmptyLabel);
            } else if label.len() > MAX_LABEL_LEN {
                return Err(Error::LabelTooLong);
            } else if !label.bytes().all(is_label_octet) {
                return Err(Error::InvalidCharacter);
            }
        }

        Ok(Self(s.to_ascii_lowercase().into_boxed_str()))
    }
}

/// Returns whether `octet` may appear in a label.
fn is_label_octet(octet: u8) -> bool {
    octet.is_ascii_alphanumeric() || octet == b'-' || octet == b'_'
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
