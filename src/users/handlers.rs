use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    error::ServiceError,
    state::AppState,
    users::{
        dto::{FetchQuery, LoginRequest, PublicUser, UpdateUserRequest, UserRequest},
        repo_types::Role,
    },
};

pub const CURSOR_HEADER: &str = "X-Cursor";

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(fetch_users).post(store_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/by-username/:username", get(get_user_by_username))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/create/admin", post(create_admin))
        .route("/users/create/staff", post(create_staff))
}

// Non-numeric ids cannot exist.
fn parse_id(raw: &str) -> Result<i64, ServiceError> {
    raw.parse::<i64>().map_err(|_| ServiceError::NotFound)
}

#[instrument(skip(state))]
pub async fn fetch_users(
    State(state): State<AppState>,
    Query(q): Query<FetchQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let page = state.users.fetch(&q.cursor, q.num).await?;
    let items: Vec<PublicUser> = page.users.into_iter().map(PublicUser::from).collect();
    Ok((
        [(CURSOR_HEADER, page.next_cursor.unwrap_or_default())],
        Json(items),
    ))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PublicUser>, ServiceError> {
    let user = state.users.get_by_id(parse_id(&id)?).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn get_user_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<PublicUser>, ServiceError> {
    let user = state.users.get_by_username(&username).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn store_user(
    State(state): State<AppState>,
    Json(payload): Json<UserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ServiceError> {
    payload.validate()?;
    let user = state.users.store(payload.into_user()).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, ServiceError> {
    let mut user = state.users.get_by_id(parse_id(&id)?).await?;
    payload.apply(&mut user)?;
    let user = state.users.update(user).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceError> {
    state.users.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<UserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ServiceError> {
    payload.validate()?;
    let user = state.users.register(payload.into_user()).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<PublicUser>, ServiceError> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ServiceError::bad_input("username and password are required"));
    }
    let user = state
        .users
        .login(payload.username.trim(), &payload.password)
        .await?;
    Ok(Json(user.into()))
}

fn expect_role(payload: &UserRequest, role: Role) -> Result<(), ServiceError> {
    match payload.role {
        Some(r) if r != role => {
            warn!(requested = %r, expected = %role, "role does not match endpoint");
            Err(ServiceError::bad_input(format!("role must be {role}")))
        }
        _ => Ok(()),
    }
}

#[instrument(skip(state, payload))]
pub async fn create_admin(
    State(state): State<AppState>,
    Json(payload): Json<UserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ServiceError> {
    payload.validate()?;
    expect_role(&payload, Role::Admin)?;
    let user = state.users.create_admin(payload.into_user()).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn create_staff(
    State(state): State<AppState>,
    Json(payload): Json<UserRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ServiceError> {
    payload.validate()?;
    expect_role(&payload, Role::Staff)?;
    let user = state.users.create_staff(payload.into_user()).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}
