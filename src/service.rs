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

//! The record operations offered by the web service, independent of
//! HTTP.
//!
//! The [`Service`] structure ties together the [`Authorizer`], the
//! [`Catalog`] of served zones, and the zone file [`Store`]. Its
//! methods are synchronous and perform blocking file I/O; async
//! callers should run them on a blocking thread pool.

use std::fmt;

use log::{debug, info};

use crate::auth::{Authorizer, Credentials};
use crate::catalog::Catalog;
use crate::name::Name;
use crate::record::{Record, RecordKey};
use crate::store::{self, Document, Store};

/// The record service. See the [module-level documentation](self).
pub struct Service {
    authorizer: Authorizer,
    catalog: Catalog,
    store: Store,
}

impl Service {
    /// Creates a new `Service` that accepts `credentials` for updates
    /// and serves the zones of `catalog` from `store`.
    pub fn new(credentials: &Credentials, catalog: Catalog, store: Store) -> Self {
        Self {
            authorizer: Authorizer::new(credentials),
            catalog,
            store,
        }
    }

    /// Returns all records of the zone that `domain` belongs to. If it
    /// belongs to no served zone, the result is empty and nothing is
    /// written to disk.
    pub fn list(&self, domain: &str) -> Result<Document, store::Error> {
        match self.route(domain) {
            Some((_, zone)) => self.store.read(zone),
            None => {
                debug!("Listing {}: no zone matches.", domain);
                Ok(Document::new())
            }
        }
    }

    /// Creates or replaces the record `(domain, rr_type, value)` with
    /// the given TTL.
    pub fn upsert(
        &self,
        credentials: &Credentials,
        domain: &str,
        rr_type: &str,
        value: &str,
        ttl: i64,
    ) -> Result<(), Error> {
        let (owner, zone) = self.authorize_and_route(credentials, domain)?;
        let (key, record) = Record::new(&owner, rr_type, value, ttl);
        self.store.upsert(zone, &key, &record)?;
        info!("Stored {} (TTL {}) in {}.", key, ttl, zone);
        Ok(())
    }

    /// Deletes the record `(domain, rr_type, value)`. Returns whether
    /// the record existed; deleting an absent record succeeds.
    pub fn remove(
        &self,
        credentials: &Credentials,
        domain: &str,
        rr_type: &str,
        value: &str,
    ) -> Result<bool, Error> {
        let (owner, zone) = self.authorize_and_route(credentials, domain)?;
        let key = RecordKey::new(&owner, rr_type, value);
        let removed = self.store.remove(zone, &key)?;
        if removed {
            info!("Removed {} from {}.", key, zone);
        } else {
            debug!("Not removing {} from {}: no such record.", key, zone);
        }
        Ok(removed)
    }

    /// Checks `credentials`, then finds the zone of `domain`. The
    /// credentials are checked first so that unauthorized clients
    /// learn nothing about the served zones.
    fn authorize_and_route(
        &self,
        credentials: &Credentials,
        domain: &str,
    ) -> Result<(Name, &Name), Error> {
        if !self.authorizer.authorize(credentials) {
            info!(
                "Rejected an update of {} with key name {:?}: wrong credentials.",
                domain, credentials.keyname,
            );
            return Err(Error::Unauthorized);
        }
        self.route(domain).ok_or(Error::ZoneNotFound)
    }

    /// Parses `domain` and finds the zone it belongs to.
    fn route(&self, domain: &str) -> Option<(Name, &Name)> {
        let owner: Name = domain.trim().parse().ok()?;
        let zone = self.catalog.lookup(&owner)?;
        Some((owner, zone))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// Errors that arise during [`Service`] updates.
#[derive(Debug)]
pub enum Error {
    /// The presented credentials do not match the configured ones.
    Unauthorized,

    /// The domain does not belong to any served zone.
    ZoneNotFound,

    /// The zone file could not be read or written.
    Store(store::Error),
}

impl From<store::Error> for Error {
    fn from(error: store::Error) -> Self {
        Self::Store(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unauthorized => f.write_str("wrong credentials"),
            Self::ZoneNotFound => f.write_str("the domain is not in any served zone"),
            Self::Store(_) => f.write_str("zone storage failed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(error) => Some(error),
            _ => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
