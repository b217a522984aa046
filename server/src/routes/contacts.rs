//! Contact list management

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::{parse_id, JsonBody};
use crate::auth::AuthUser;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{ContactInfo, CreateContactRequest, MessageResponse, UserInfo};
use crate::state::SharedState;

pub async fn list_contacts(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<ContactInfo>>> {
    let contacts = db::contacts::list_contacts(&state.db, user.user_id).await?;
    Ok(Json(contacts))
}

/// Users that could still be added as contacts
pub async fn potential_contacts(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Vec<UserInfo>>> {
    let users = db::users::list_potential_contacts(&state.db, user.user_id).await?;
    Ok(Json(users))
}

pub async fn create_contact(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(req): JsonBody<CreateContactRequest>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let contact_id = req
        .contact_id
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::bad_request("A valid contact_id is required"))?;

    if contact_id == user.user_id {
        return Err(AppError::bad_request("You cannot add yourself as a contact"));
    }

    let contact = db::users::find_by_id(&state.db, contact_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if db::contacts::contact_exists(&state.db, user.user_id, contact_id).await? {
        return Err(AppError::conflict("This user is already in your contact list"));
    }

    db::contacts::add_contact(&state.db, user.user_id, contact_id).await?;
    tracing::info!("User {} added contact {}", user.user_id, contact_id);

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(format!(
            "{} was added to your contacts",
            contact.name
        ))),
    ))
}

pub async fn delete_contact(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let contact_id = parse_id(&raw_id, "contact")?;

    let removed = db::contacts::remove_contact(&state.db, user.user_id, contact_id).await?;
    if removed == 0 {
        return Err(AppError::not_found("Contact not found"));
    }

    tracing::info!("User {} removed contact {}", user.user_id, contact_id);
    Ok(Json(MessageResponse::new("Contact removed")))
}
