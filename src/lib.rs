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

//! A small web service for managing DNS-like zone records.
//!
//! Records are grouped into zones, and each zone is kept as a flat JSON
//! document on disk. Clients list a zone's records and create or delete
//! individual records over HTTP, authenticating updates with a shared
//! key name and key value.
//!
//! The pieces, from the bottom up:
//!
//! * [`name`]: validated, normalized domain names;
//! * [`record`]: record keys and the values stored under them;
//! * [`auth`]: the credential check for updates;
//! * [`catalog`]: finding the served zone a domain belongs to;
//! * [`store`]: the zone files, with per-zone write serialization and
//!   atomic replacement;
//! * [`service`]: the record operations, combining all of the above;
//! * [`api`]: the HTTP interface over a [`service::Service`].
//!
//! The `midaasd` binary wires these together with configuration,
//! logging, and signal handling.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod name;
pub mod record;
pub mod service;
pub mod store;

mod util;
