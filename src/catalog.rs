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

//! Implementation of the [`Catalog`] structure.

use std::collections::HashMap;

use crate::name::Name;

/// The set of zones served by the process.
///
/// A `Catalog` maintains a tree of labels and places zones at nodes
/// according to their names. This makes it simple to look up the zone
/// that is the nearest ancestor to any domain name (see
/// [`Catalog::lookup`]). Matching is by whole labels, so
/// `evil-dev.local` and `dev.local.evil.test` are *not* in the zone
/// `dev.local`.
#[derive(Debug, Default)]
pub struct Catalog {
    root: Node,
}

/// A node in the label tree. `zone` is set when a configured zone's
/// apex is at this node.
#[derive(Debug, Default)]
struct Node {
    children: HashMap<Box<str>, Node>,
    zone: Option<Name>,
}

impl Catalog {
    /// Creates a new, initially empty `Catalog`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `zone` to the catalog. Returns `false` if it was already
    /// present.
    pub fn insert(&mut self, zone: Name) -> bool {
        let mut node = &mut self.root;
        for label in zone.labels().rev() {
            node = node.children.entry(label.into()).or_default();
        }
        if node.zone.is_some() {
            false
        } else {
            node.zone = Some(zone);
            true
        }
    }

    /// Looks up the zone in the `Catalog` that is the nearest ancestor
    /// to `name` (i.e., the zone whose name matches the most
    /// consecutive labels in `name`, starting from the right).
    pub fn lookup(&self, name: &Name) -> Option<&Name> {
        let mut node = &self.root;
        let mut found = None;
        for label in name.labels().rev() {
            match node.children.get(label) {
                Some(child) => node = child,
                None => break,
            }
            found = node.zone.as_ref().or(found);
        }
        found
    }

    /// Returns an iterator over the zones in the catalog, in no
    /// particular order.
    pub fn zones(&self) -> impl Iterator<Item = &Name> {
        let mut stack = vec![&self.root];
        std::iter::from_fn(move || {
            while let Some(node) = stack.pop() {
                stack.extend(node.children.values());
                if let Some(ref zone) = node.zone {
                    return Some(zone);
                }
            }
            None
        })
    }
}

impl FromIterator<Name> for Catalog {
    fn from_iter<I: IntoIterator<Item = Name>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for zone in iter {
            catalog.insert(zone);
        }
        catalog
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
