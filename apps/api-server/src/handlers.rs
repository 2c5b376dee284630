//! HTTP handlers for the `/api/v1/users` resource.
//!
//! Pure translation: decode the request, call the service under the request
//! deadline, map the domain error kind to a status code.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::id::UuidV4Generator;
use domain::service::UserService;
use domain::{CoreError, NewUser, User, UserRepository};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Service wired against whichever repository was selected at startup.
pub type DynUserService = UserService<Arc<dyn UserRepository>, UuidV4Generator>;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<DynUserService>,
    pub request_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    let users = Router::new()
        .route("/users", post(create_user))
        .route("/users/:id", get(get_user));
    Router::new().nest("/api/v1", users).with_state(state)
}

#[derive(Deserialize)]
struct CreateUserReq {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

#[derive(Serialize)]
struct UserOut {
    id: String,
    name: String,
    email: String,
}

impl From<User> for UserOut {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// Failure of a single request, as seen by the transport.
#[derive(Debug)]
enum ApiError {
    Core(CoreError),
    DeadlineExceeded,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Core(CoreError::NotFound) => {
                info!("user not found");
                (StatusCode::NOT_FOUND, http_common::json_err("not_found"))
            }
            ApiError::Core(CoreError::Validation(msg)) => {
                info!(reason = %msg, "rejected invalid request");
                (
                    StatusCode::BAD_REQUEST,
                    http_common::json_error_with_message("invalid_request", &msg),
                )
            }
            ApiError::Core(CoreError::Storage(msg)) => {
                error!(err = %msg, "storage failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    http_common::json_err("internal"),
                )
            }
            ApiError::DeadlineExceeded => {
                warn!("request deadline exceeded");
                (StatusCode::GATEWAY_TIMEOUT, http_common::json_err("timeout"))
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Await a service call, dropping it (and the repository work under it) once
/// the deadline passes.
async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(ApiError::Core),
        Err(_) => Err(ApiError::DeadlineExceeded),
    }
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match with_deadline(state.request_timeout, state.users.get_user(&id)).await {
        Ok(user) => (StatusCode::OK, Json(UserOut::from(user))).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<CreateUserReq>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            warn!(err = %rejection.body_text(), "bad create body");
            return (
                StatusCode::BAD_REQUEST,
                Json(http_common::json_error_with_message(
                    "invalid_request",
                    &rejection.body_text(),
                )),
            )
                .into_response();
        }
    };

    let input = NewUser::new(body.name, body.email);
    match with_deadline(state.request_timeout, state.users.create_user(input)).await {
        Ok(user) => {
            info!(id = %user.id, "user created");
            (StatusCode::CREATED, Json(UserOut::from(user))).into_response()
        }
        Err(e) => e.into_response(),
    }
}
