use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{self, ROLE_ADMIN, ROLE_CASHIER};
use crate::db::DbPool;
use crate::entities::user::{self, Entity as User};
use crate::errors::{is_unique_violation, ServiceError};
use crate::events::{Event, EventSender};
use crate::ids::new_entity_id;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,
    /// Defaults to CASHIER when absent.
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: String,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub total: u64,
}

#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a user with a hashed credential. Emails are normalized to
    /// lowercase so uniqueness is case-insensitive.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create_user(
        &self,
        request: CreateUserRequest,
    ) -> Result<UserResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let role = match request.role.as_deref() {
            None => ROLE_CASHIER.to_string(),
            Some(r) if r == ROLE_ADMIN || r == ROLE_CASHIER => r.to_string(),
            Some(_) => {
                return Err(ServiceError::ValidationError(
                    "Role must be one of: ADMIN, CASHIER".to_string(),
                ));
            }
        };

        let db = &*self.db_pool;
        let email = request.email.to_lowercase();

        let existing = User::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to check for existing email");
                ServiceError::DatabaseError(e)
            })?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "User with email {} already exists",
                email
            )));
        }

        let password_hash = auth::hash_password(&request.password)
            .map_err(|e| ServiceError::HashError(e.to_string()))?;

        let now = Utc::now();
        let model = user::Model {
            id: new_entity_id(),
            email,
            password_hash: Some(password_hash),
            name: request.name,
            role,
            created_at: now,
            updated_at: now,
        };

        let saved = match model.clone().into_active_model().insert(db).await {
            Ok(saved) => saved,
            Err(e) if is_unique_violation(&e) => {
                return Err(ServiceError::Conflict(format!(
                    "User with email {} already exists",
                    model.email
                )));
            }
            Err(e) => {
                error!(error = %e, "failed to insert user");
                return Err(ServiceError::DatabaseError(e));
            }
        };

        info!(user_id = %saved.id, email = %saved.email, role = %saved.role, "user created");
        if let Some(event_sender) = &self.event_sender {
            event_sender.send_or_log(Event::UserCreated(saved.id)).await;
        }

        Ok(Self::model_to_response(saved))
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<UserResponse>, ServiceError> {
        let db = &*self.db_pool;

        let user_model = User::find_by_id(user_id).one(db).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "failed to fetch user");
            ServiceError::DatabaseError(e)
        })?;

        Ok(user_model.map(Self::model_to_response))
    }

    /// Full record including the credential hash. Login is the only caller;
    /// everything user-facing goes through [`UserResponse`].
    #[instrument(skip(self), fields(email = %email))]
    pub async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<user::Model>, ServiceError> {
        let db = &*self.db_pool;

        User::find()
            .filter(user::Column::Email.eq(email.to_lowercase()))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to fetch user by email");
                ServiceError::DatabaseError(e)
            })
    }

    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<UserListResponse, ServiceError> {
        let db = &*self.db_pool;

        let total = User::find().count(db).await.map_err(|e| {
            error!(error = %e, "failed to count users");
            ServiceError::DatabaseError(e)
        })?;

        let users = User::find()
            .order_by_asc(user::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "failed to list users");
                ServiceError::DatabaseError(e)
            })?;

        Ok(UserListResponse {
            users: users.into_iter().map(Self::model_to_response).collect(),
            total,
        })
    }

    /// Partial update of email and display name. Role and credential changes
    /// go through dedicated paths.
    #[instrument(skip(self, request))]
    pub async fn update_user(
        &self,
        user_id: Uuid,
        request: UpdateUserRequest,
    ) -> Result<UserResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;

        let Some(existing) = User::find_by_id(user_id).one(db).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "failed to fetch user");
            ServiceError::DatabaseError(e)
        })?
        else {
            return Err(ServiceError::NotFound(format!(
                "User with id {} not found",
                user_id
            )));
        };

        let new_email = request.email.map(|e| e.to_lowercase());
        if let Some(email) = new_email.as_deref() {
            if email != existing.email {
                let clash = User::find()
                    .filter(user::Column::Email.eq(email))
                    .filter(user::Column::Id.ne(user_id))
                    .one(db)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "failed to check for email clash");
                        ServiceError::DatabaseError(e)
                    })?;
                if clash.is_some() {
                    return Err(ServiceError::Conflict(format!(
                        "Email {} is already in use",
                        email
                    )));
                }
            }
        }

        let mut active = existing.into_active_model();
        if let Some(email) = new_email {
            active.email = Set(email);
        }
        if let Some(name) = request.name {
            active.name = Set(Some(name));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "failed to update user");
            ServiceError::DatabaseError(e)
        })?;

        info!(user_id = %user_id, "user updated");
        if let Some(event_sender) = &self.event_sender {
            event_sender.send_or_log(Event::UserUpdated(user_id)).await;
        }

        Ok(Self::model_to_response(updated))
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let existing = User::find_by_id(user_id).one(db).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "failed to fetch user");
            ServiceError::DatabaseError(e)
        })?;
        if existing.is_none() {
            return Err(ServiceError::NotFound(format!(
                "User with id {} not found",
                user_id
            )));
        }

        User::delete_by_id(user_id).exec(db).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "failed to delete user");
            ServiceError::DatabaseError(e)
        })?;

        info!(user_id = %user_id, "user deleted");
        if let Some(event_sender) = &self.event_sender {
            event_sender.send_or_log(Event::UserDeleted(user_id)).await;
        }

        Ok(())
    }

    /// Replaces the stored credential hash outright.
    #[instrument(skip(self, new_password))]
    pub async fn reset_password(
        &self,
        user_id: Uuid,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        if new_password.len() < 8 {
            return Err(ServiceError::ValidationError(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let db = &*self.db_pool;

        let Some(existing) = User::find_by_id(user_id).one(db).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "failed to fetch user");
            ServiceError::DatabaseError(e)
        })?
        else {
            return Err(ServiceError::NotFound(format!(
                "User with id {} not found",
                user_id
            )));
        };

        let password_hash = auth::hash_password(new_password)
            .map_err(|e| ServiceError::HashError(e.to_string()))?;

        let mut active = existing.into_active_model();
        active.password_hash = Set(Some(password_hash));
        active.updated_at = Set(Utc::now());
        active.update(db).await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "failed to reset password");
            ServiceError::DatabaseError(e)
        })?;

        info!(user_id = %user_id, "password reset");
        if let Some(event_sender) = &self.event_sender {
            event_sender.send_or_log(Event::UserUpdated(user_id)).await;
        }

        Ok(())
    }

    /// Users without a stored credential can never authenticate.
    pub fn verify_user_password(user: &user::Model, password: &str) -> bool {
        match user.password_hash.as_deref() {
            Some(hash) => auth::verify_password(password, hash),
            None => false,
        }
    }

    pub fn model_to_response(model: user::Model) -> UserResponse {
        UserResponse {
            id: model.id,
            email: model.email,
            name: model.name,
            role: model.role,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
