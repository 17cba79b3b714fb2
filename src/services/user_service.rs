use std::sync::Arc;

use uuid::Uuid;

use crate::database::Repository;
use crate::error::{Error, Result};
use crate::models::test::Test;
use crate::models::user::{normalize_email, NewUser, UpdateUser, User, UserRole};
use crate::utils::validation::validate;

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Repository>,
}

impl UserService {
    pub fn new(store: Arc<dyn Repository>) -> Self {
        Self { store }
    }

    pub async fn create_user(&self, mut payload: NewUser) -> Result<User> {
        payload.email = normalize_email(&payload.email);
        validate(&payload)?;

        if self.store.find_user_by_email(&payload.email).await?.is_some() {
            return Err(Error::taken("email"));
        }
        self.store.insert_user(&payload).await
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| Error::not_found("User", user_id))
    }

    pub async fn update_user(&self, user_id: Uuid, mut patch: UpdateUser) -> Result<User> {
        patch.email = patch.email.as_deref().map(normalize_email);
        validate(&patch)?;
        let mut user = self.get_user(user_id).await?;

        if let Some(email) = &patch.email {
            if let Some(existing) = self.store.find_user_by_email(email).await? {
                if existing.id != user_id {
                    return Err(Error::taken("email"));
                }
            }
        }

        user.apply(patch);
        self.store.update_user(&user).await
    }

    /// Ordered by email; `None` lists every role.
    pub async fn list_users(&self, role: Option<UserRole>) -> Result<Vec<User>> {
        self.store.list_users(role).await
    }

    /// Distinct tests at `level` the user has attempted.
    pub async fn tests_by_level(&self, user_id: Uuid, level: i32) -> Result<Vec<Test>> {
        self.get_user(user_id).await?;
        self.store.list_user_tests(user_id, Some(level)).await
    }
}
