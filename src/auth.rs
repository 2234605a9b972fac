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

//! Shared-secret authorization of mutating requests.
//!
//! Clients authenticate with a TSIG-style pair of a key name and a key
//! value. Unlike real TSIG ([RFC 8945]), nothing is signed: the pair is
//! simply compared against the single pair configured for the process.
//!
//! The comparison should not reveal how much of a presented secret was
//! correct. Rather than comparing the strings directly, we compute an
//! HMAC-SHA256 tag of each presented field under a random key chosen at
//! startup and verify it against the tag of the configured field with
//! [`Mac::verify_slice`], which compares in constant time. Since the
//! tags have a fixed length, this also hides the length of the secret.
//!
//! [RFC 8945]: https://datatracker.ietf.org/doc/html/rfc8945

use std::fmt;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// A key name and key value pair.
#[derive(Clone, Deserialize, Eq, PartialEq)]
pub struct Credentials {
    pub keyname: String,
    pub keyvalue: String,
}

impl Credentials {
    pub fn new(keyname: impl Into<String>, keyvalue: impl Into<String>) -> Self {
        Self {
            keyname: keyname.into(),
            keyvalue: keyvalue.into(),
        }
    }
}

// The key value is a secret, so it is never printed.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("keyname", &self.keyname)
            .field("keyvalue", &"<redacted>")
            .finish()
    }
}

/// Decides whether presented [`Credentials`] match the configured
/// ones. See the [module-level documentation](self).
pub struct Authorizer {
    mac_key: [u8; 32],
    keyname_tag: Box<[u8]>,
    keyvalue_tag: Box<[u8]>,
}

impl Authorizer {
    /// Creates an `Authorizer` that accepts exactly `configured`.
    pub fn new(configured: &Credentials) -> Self {
        let mac_key: [u8; 32] = rand::random();
        Self {
            keyname_tag: tag(&mac_key, &configured.keyname),
            keyvalue_tag: tag(&mac_key, &configured.keyvalue),
            mac_key,
        }
    }

    /// Returns whether `presented` is authorized: both the key name and
    /// the key value must match. Both fields are always checked.
    pub fn authorize(&self, presented: &Credentials) -> bool {
        let keyname_ok = self.verify(&presented.keyname, &self.keyname_tag);
        let keyvalue_ok = self.verify(&presented.keyvalue, &self.keyvalue_tag);
        keyname_ok & keyvalue_ok
    }

    fn verify(&self, presented: &str, expected_tag: &[u8]) -> bool {
        mac(&self.mac_key, presented)
            .verify_slice(expected_tag)
            .is_ok()
    }
}

/// Prepares a MAC over `data`. HMAC accepts keys of any length, so
/// creating it cannot fail.
fn mac(key: &[u8], data: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(key).unwrap();
    mac.update(data.as_bytes());
    mac
}

fn tag(key: &[u8], data: &str) -> Box<[u8]> {
    mac(key, data).finalize().into_bytes().to_vec().into_boxed_slice()
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
