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

//! The HTTP interface of the service.
//!
//! | Method   | Path                          | Body                        |
//! |----------|-------------------------------|-----------------------------|
//! | `GET`    | `/healthz`                    |                             |
//! | `GET`    | `/ws/{domain}`                |                             |
//! | `PUT`    | `/ws/{domain}/{type}/{value}` | `{ttl, keyname, keyvalue}`  |
//! | `DELETE` | `/ws/{domain}/{type}/{value}` | `{keyname, keyvalue}`       |
//!
//! Updates answer with `{"status": "OK"}` or, when the credentials are
//! wrong or the domain is in no served zone, with
//! `{"status": "ERROR", "message": ...}`. These are still `200 OK`
//! responses; only storage failures produce a `500`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::task::{self, JoinError};

use crate::auth::Credentials;
use crate::record::DEFAULT_TTL;
use crate::service::{self, Service};
use crate::store::{self, Document};
use crate::util::error_chain;

/// Builds the [`Router`] serving `service`.
pub fn router(service: Arc<Service>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws/:domain", get(list_records))
        .route("/ws/:domain/:rr_type/:value", put(put_record).delete(delete_record))
        .layer(middleware::from_fn(log_request))
        .with_state(service)
}

////////////////////////////////////////////////////////////////////////
// MESSAGES                                                           //
////////////////////////////////////////////////////////////////////////

/// The status object returned by updates and health checks.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Status {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_owned(),
            message: None,
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: "ERROR".to_owned(),
            message: Some(message.to_owned()),
        }
    }
}

/// The body of a `PUT` request. A missing TTL means [`DEFAULT_TTL`].
/// Any integer TTL is stored as given.
#[derive(Debug, Deserialize)]
struct PutBody {
    ttl: Option<i64>,
    #[serde(flatten)]
    credentials: Credentials,
}

/// The body of a `DELETE` request.
#[derive(Debug, Deserialize)]
struct DeleteBody {
    #[serde(flatten)]
    credentials: Credentials,
}

////////////////////////////////////////////////////////////////////////
// HANDLERS                                                           //
////////////////////////////////////////////////////////////////////////

async fn healthz() -> Json<Status> {
    Json(Status::ok())
}

async fn list_records(
    State(service): State<Arc<Service>>,
    Path(domain): Path<String>,
) -> Result<Json<Document>, InternalError> {
    let document = task::spawn_blocking(move || service.list(&domain)).await??;
    Ok(Json(document))
}

async fn put_record(
    State(service): State<Arc<Service>>,
    Path((domain, rr_type, value)): Path<(String, String, String)>,
    Json(body): Json<PutBody>,
) -> Result<Json<Status>, InternalError> {
    let ttl = body.ttl.unwrap_or(DEFAULT_TTL);
    let result = task::spawn_blocking(move || {
        service.upsert(&body.credentials, &domain, &rr_type, &value, ttl)
    })
    .await?;
    respond(result, "zone not available")
}

async fn delete_record(
    State(service): State<Arc<Service>>,
    Path((domain, rr_type, value)): Path<(String, String, String)>,
    Json(body): Json<DeleteBody>,
) -> Result<Json<Status>, InternalError> {
    let result = task::spawn_blocking(move || {
        service
            .remove(&body.credentials, &domain, &rr_type, &value)
            .map(drop)
    })
    .await?;
    respond(result, "no domain")
}

/// Converts the result of an update into a response. The message for
/// [`service::Error::ZoneNotFound`] differs between `PUT` and `DELETE`.
fn respond(
    result: Result<(), service::Error>,
    zone_not_found_message: &str,
) -> Result<Json<Status>, InternalError> {
    match result {
        Ok(()) => Ok(Json(Status::ok())),
        Err(service::Error::Unauthorized) => Ok(Json(Status::error("wrong credentials"))),
        Err(service::Error::ZoneNotFound) => Ok(Json(Status::error(zone_not_found_message))),
        Err(service::Error::Store(e)) => Err(e.into()),
    }
}

/// Logs each request with its outcome.
async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_owned());
    let start = Instant::now();
    let response = next.run(request).await;
    info!(
        "{} {} {} -> {} in {} ms",
        peer,
        method,
        path,
        response.status().as_u16(),
        start.elapsed().as_millis(),
    );
    response
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An unexpected failure, reported to the client as a `500`. The cause
/// is logged when the error is created.
#[derive(Debug)]
struct InternalError;

impl From<store::Error> for InternalError {
    fn from(e: store::Error) -> Self {
        error!("Zone storage failed: {}.", error_chain(&e));
        Self
    }
}

impl From<JoinError> for InternalError {
    fn from(e: JoinError) -> Self {
        error!("A request handler task failed: {}.", e);
        Self
    }
}

impl IntoResponse for InternalError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Status::error("internal error")),
        )
            .into_response()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
