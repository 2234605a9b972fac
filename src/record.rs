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

//! Record keys and the record values stored under them.
//!
//! A zone document maps [`RecordKey`]s to [`Record`]s. The key embeds
//! the owner, the type, and the value of the record:
//!
//! ```text
//! host.d1.dev.local./A/10.0.0.1
//! ```
//!
//! so that any number of records of different types and values can
//! coexist for the same owner. Both the key and the stored record are
//! always derived together by [`Record::new`], which applies the
//! type-specific normalization first. Deleting a record recomputes the
//! key the same way, so the two operations always agree.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::name::Name;
use crate::util::Caseless;

/// The TTL stored when a request does not specify one.
pub const DEFAULT_TTL: i64 = 3600;

/// A record value as stored in a zone document.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub rr_type: String,
    pub value: String,
    pub ttl: i64,
}

impl Record {
    /// Builds the record for `(owner, rr_type, value, ttl)` along with
    /// the key it is stored under.
    pub fn new(owner: &Name, rr_type: &str, value: &str, ttl: i64) -> (RecordKey, Self) {
        let value = normalize_value(rr_type, value);
        let key = RecordKey::from_normalized(owner, rr_type, &value);
        let record = Self {
            rr_type: rr_type.to_owned(),
            value,
            ttl,
        };
        (key, record)
    }
}

/// The canonical key of a record within a zone document. See the
/// [module-level documentation](self) for the format.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RecordKey(String);

impl RecordKey {
    /// Computes the key of the record `(owner, rr_type, value)`. The
    /// value is normalized in the same way as by [`Record::new`].
    pub fn new(owner: &Name, rr_type: &str, value: &str) -> Self {
        Self::from_normalized(owner, rr_type, &normalize_value(rr_type, value))
    }

    fn from_normalized(owner: &Name, rr_type: &str, value: &str) -> Self {
        Self(format!("{}./{}/{}", owner, rr_type, value))
    }

    /// Splits a key into its owner, type, and value. Returns [`None`]
    /// if `key` is not in the canonical format.
    pub fn parse(key: &str) -> Option<(Name, &str, &str)> {
        let (owner, rest) = key.split_once("./")?;
        let (rr_type, value) = rest.split_once('/')?;
        Some((owner.parse().ok()?, rr_type, value))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Applies type-specific normalization to a record value. Currently
/// the only rule is that CNAME targets are made absolute with a
/// trailing dot.
fn normalize_value(rr_type: &str, value: &str) -> String {
    if Caseless(rr_type) == Caseless("CNAME") && !value.ends_with('.') {
        format!("{}.", value)
    } else {
        value.to_owned()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Name {
        "host.d1.dev.local".parse().unwrap()
    }

    #[test]
    fn new_derives_key_and_record() {
        let (key, record) = Record::new(&owner(), "A", "10.0.0.1", 300);
        assert_eq!(key.as_str(), "host.d1.dev.local./A/10.0.0.1");
        assert_eq!(
            record,
            Record {
                rr_type: "A".to_owned(),
                value: "10.0.0.1".to_owned(),
                ttl: 300,
            }
        );
    }

    #[test]
    fn cname_values_become_absolute() {
        let (key, record) = Record::new(&owner(), "CNAME", "target.d1.dev.local", 60);
        assert_eq!(record.value, "target.d1.dev.local.");
        assert_eq!(key.as_str(), "host.d1.dev.local./CNAME/target.d1.dev.local.");

        // Already-absolute targets are left alone, and the type keeps
        // its original spelling.
        let (key, record) = Record::new(&owner(), "cname", "target.d1.dev.local.", 60);
        assert_eq!(record.value, "target.d1.dev.local.");
        assert_eq!(record.rr_type, "cname");
        assert_eq!(key.as_str(), "host.d1.dev.local./cname/target.d1.dev.local.");
    }

    #[test]
    fn non_cname_values_are_untouched() {
        let (_, record) = Record::new(&owner(), "TXT", "v=spf1 -all", 60);
        assert_eq!(record.value, "v=spf1 -all");
    }

    #[test]
    fn key_new_matches_record_new() {
        for (rr_type, value) in [("A", "10.0.0.1"), ("CNAME", "www.d1.dev.local")] {
            let (from_record, _) = Record::new(&owner(), rr_type, value, 1);
            assert_eq!(RecordKey::new(&owner(), rr_type, value), from_record);
        }
    }

    #[test]
    fn parse_splits_keys() {
        let key = RecordKey::new(&owner(), "CNAME", "www.d1.dev.local");
        let (owner_out, rr_type, value) = RecordKey::parse(key.as_str()).unwrap();
        assert_eq!(owner_out, owner());
        assert_eq!(rr_type, "CNAME");
        assert_eq!(value, "www.d1.dev.local.");
        assert!(RecordKey::parse("host.d1.dev.local").is_none());
    }

    #[test]
    fn record_serializes_with_type_field() {
        let (_, record) = Record::new(&owner(), "A", "10.0.0.1", 300);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            serde_json::json!({"type": "A", "value": "10.0.0.1", "ttl": 300}),
        );
    }
}
