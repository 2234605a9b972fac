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

//! Error types for the zone file [`Store`](super::Store).

use std::fmt;
use std::io;
use std::path::Path;

/// An I/O failure while accessing a zone file. Unparseable zone files
/// are *not* errors: the store heals them (see
/// [`Store::ensure`](super::Store::ensure)).
#[derive(Debug)]
pub struct Error {
    path: Box<Path>,
    kind: ErrorKind,
    io_err: io::Error,
}

/// The operation that failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum ErrorKind {
    /// Creating the data directory.
    CreateDir,

    /// Reading a zone file.
    Read,

    /// Writing a zone file (including the temporary file and the
    /// rename over the old file).
    Write,
}

impl Error {
    pub(super) fn new(kind: ErrorKind, path: &Path, io_err: io::Error) -> Self {
        Self {
            path: path.into(),
            kind,
            io_err,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let action = match self.kind {
            ErrorKind::CreateDir => "create the data directory",
            ErrorKind::Read => "read the zone file",
            ErrorKind::Write => "write the zone file",
        };
        write!(f, "failed to {} {}", action, self.path.display())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.io_err)
    }
}

/// A result type for [`Store`](super::Store) operations.
pub type Result<T> = std::result::Result<T, Error>;
