//! Route handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use super::rejection::Rejection;
use super::AppState;
use crate::accounts::{validate_registration, Account};
use crate::credential::Identity;
use crate::links::{Link, NewLink};

/// Body of the register and login requests.
#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

/// Body returned after a successful register or login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: Account,
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Rejection> {
    payload
        .map(|Json(body)| body)
        .map_err(|_| Rejection::BadRequest("Invalid request format".to_string()))
}

fn issue_for(state: &AppState, account: Account) -> Result<Json<AuthResponse>, Rejection> {
    let token = state.codec.issue(&account.identity()).map_err(|e| {
        error!(error = %e, "Failed to issue credential");
        Rejection::Internal
    })?;
    Ok(Json(AuthResponse {
        token,
        user: account,
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "linkgate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), Rejection> {
    let request = parse_body(payload)?;
    let username = validate_registration(&request.username, &request.password)?;

    let account = state
        .accounts
        .create(username, &request.password, false)
        .await?;
    info!(user_id = account.id, "Registered account");

    Ok((StatusCode::CREATED, issue_for(&state, account)?))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, Rejection> {
    let request = parse_body(payload)?;
    let username = request.username.trim();
    if username.is_empty() || request.password.is_empty() {
        return Err(Rejection::BadRequest(
            "Username and password required".to_string(),
        ));
    }

    let account = state
        .accounts
        .authenticate(username, &request.password)
        .await?;
    issue_for(&state, account)
}

pub async fn me(identity: Identity) -> Json<Identity> {
    Json(identity)
}

pub async fn list_links(State(state): State<AppState>, identity: Identity) -> Json<Vec<Link>> {
    Json(state.links.list_for_owner(identity.user_id).await)
}

pub async fn create_link(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<NewLink>, JsonRejection>,
) -> Result<(StatusCode, Json<Link>), Rejection> {
    let link = parse_body(payload)?;
    if link.url.trim().is_empty() {
        return Err(Rejection::BadRequest("URL is required".to_string()));
    }

    let link = state.links.create(identity.user_id, link).await;
    Ok((StatusCode::CREATED, Json(link)))
}

pub async fn delete_link(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<StatusCode, Rejection> {
    if state.links.delete(id, identity.user_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Rejection::NotFound)
    }
}

/// Body of the privacy change request.
#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub is_public: bool,
}

pub async fn set_link_visibility(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
    payload: Result<Json<VisibilityRequest>, JsonRejection>,
) -> Result<Json<Link>, Rejection> {
    let request = parse_body(payload)?;
    state
        .links
        .set_public(id, identity.user_id, request.is_public)
        .await
        .map(Json)
        .ok_or(Rejection::NotFound)
}

pub async fn public_links(State(state): State<AppState>) -> Json<Vec<Link>> {
    Json(state.links.list_public().await)
}

pub async fn admin_users(State(state): State<AppState>) -> Json<Vec<Account>> {
    Json(state.accounts.list().await)
}

pub async fn admin_links(State(state): State<AppState>) -> Json<Vec<Link>> {
    Json(state.links.list_all().await)
}

pub async fn admin_delete_link(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<StatusCode, Rejection> {
    if state.links.delete_any(id).await {
        info!(admin_id = identity.user_id, link_id = id, "Admin deleted link");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Rejection::NotFound)
    }
}

/// Body of the admin flag change request.
#[derive(Debug, Deserialize)]
pub struct AdminFlagRequest {
    pub is_admin: bool,
}

pub async fn admin_set_user_admin(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
    payload: Result<Json<AdminFlagRequest>, JsonRejection>,
) -> Result<Json<Account>, Rejection> {
    if id == identity.user_id {
        return Err(Rejection::BadRequest(
            "Cannot modify own admin status".to_string(),
        ));
    }
    let request = parse_body(payload)?;

    let account = state
        .accounts
        .set_admin(id, request.is_admin)
        .await
        .ok_or(Rejection::NotFound)?;
    info!(
        admin_id = identity.user_id,
        user_id = id,
        is_admin = request.is_admin,
        "Admin changed user privileges"
    );
    Ok(Json(account))
}

pub async fn admin_delete_user(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<i64>,
) -> Result<StatusCode, Rejection> {
    if id == identity.user_id {
        return Err(Rejection::BadRequest("Cannot delete own account".to_string()));
    }
    if !state.accounts.delete(id).await {
        return Err(Rejection::NotFound);
    }

    let links = state.links.delete_owned_by(id).await;
    info!(admin_id = identity.user_id, user_id = id, links, "Admin deleted user");
    Ok(StatusCode::NO_CONTENT)
}
