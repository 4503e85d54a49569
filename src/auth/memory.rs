//! In-process stores, used by tests and by embedders that do not want a
//! database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::UserStore;
use crate::auth::repo_types::{Account, NewAccount};
use crate::auth::revocation::RevokedTokens;
use crate::error::AuthError;

#[derive(Default)]
struct Users {
    next_id: i64,
    by_id: HashMap<i64, Account>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Users>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Users> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<F>(&self, id: i64, f: F) -> Result<(), AuthError>
    where
        F: FnOnce(&mut Account),
    {
        let mut users = self.lock();
        let account = users
            .by_id
            .get_mut(&id)
            .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("user {id} does not exist")))?;
        f(account);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Account>, AuthError> {
        Ok(self.lock().by_id.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, AuthError> {
        Ok(self
            .lock()
            .by_id
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, AuthError> {
        Ok(self.lock().by_id.values().find(|a| a.email == email).cloned())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.lock().by_id.values().any(|a| a.email == email))
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AuthError> {
        Ok(self.lock().by_id.values().any(|a| a.username == username))
    }

    async fn insert(&self, new: NewAccount) -> Result<Account, AuthError> {
        let mut users = self.lock();
        if users.by_id.values().any(|a| a.username == new.username) {
            return Err(AuthError::DuplicateUsername);
        }
        if users.by_id.values().any(|a| a.email == new.email) {
            return Err(AuthError::DuplicateEmail);
        }
        users.next_id += 1;
        let account = Account {
            id: users.next_id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            gender: new.gender,
            date_of_birth: new.date_of_birth,
            role: new.role,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            date_joined: OffsetDateTime::now_utc(),
            last_login: None,
        };
        users.by_id.insert(account.id, account.clone());
        Ok(account)
    }

    async fn update_profile(&self, account: &Account) -> Result<Account, AuthError> {
        let mut users = self.lock();
        if users
            .by_id
            .values()
            .any(|a| a.id != account.id && a.email == account.email)
        {
            return Err(AuthError::DuplicateEmail);
        }
        let stored = users
            .by_id
            .get_mut(&account.id)
            .ok_or_else(|| AuthError::Internal(anyhow::anyhow!("user {} does not exist", account.id)))?;
        stored.email = account.email.clone();
        stored.first_name = account.first_name.clone();
        stored.last_name = account.last_name.clone();
        stored.gender = account.gender;
        stored.date_of_birth = account.date_of_birth;
        Ok(stored.clone())
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<(), AuthError> {
        self.update(id, |a| a.password_hash = password_hash.to_string())
    }

    async fn touch_last_login(&self, id: i64, at: OffsetDateTime) -> Result<(), AuthError> {
        self.update(id, |a| a.last_login = Some(at))
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), AuthError> {
        self.update(id, |a| a.is_active = active)
    }
}

#[derive(Default)]
pub struct MemoryRevokedTokens {
    revoked: Mutex<HashMap<Uuid, (i64, OffsetDateTime)>>,
}

impl MemoryRevokedTokens {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevokedTokens for MemoryRevokedTokens {
    async fn revoke(
        &self,
        jti: Uuid,
        user_id: i64,
        expires_at: OffsetDateTime,
    ) -> Result<bool, AuthError> {
        let mut revoked = self.revoked.lock().unwrap_or_else(PoisonError::into_inner);
        if revoked.contains_key(&jti) {
            return Ok(false);
        }
        revoked.insert(jti, (user_id, expires_at));
        Ok(true)
    }

    async fn is_revoked(&self, jti: Uuid) -> Result<bool, AuthError> {
        Ok(self
            .revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&jti))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Role;

    fn new_account(username: &str, email: &str) -> NewAccount {
        NewAccount {
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            first_name: "First".into(),
            last_name: "Last".into(),
            gender: None,
            date_of_birth: None,
            role: Role::Customer,
        }
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_rejects_duplicates() {
        let store = MemoryUserStore::new();
        let a = store.insert(new_account("a", "a@x.com")).await.unwrap();
        let b = store.insert(new_account("b", "b@x.com")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(a.is_active);

        let err = store.insert(new_account("a", "c@x.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateUsername));
        let err = store.insert(new_account("c", "b@x.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn profile_update_keeps_email_unique() {
        let store = MemoryUserStore::new();
        store.insert(new_account("a", "a@x.com")).await.unwrap();
        let mut b = store.insert(new_account("b", "b@x.com")).await.unwrap();
        b.email = "a@x.com".into();
        let err = store.update_profile(&b).await.unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail));
    }

    #[tokio::test]
    async fn revoking_twice_reports_the_second_attempt() {
        let tokens = MemoryRevokedTokens::new();
        let jti = Uuid::new_v4();
        let exp = OffsetDateTime::now_utc();
        assert!(!tokens.is_revoked(jti).await.unwrap());
        assert!(tokens.revoke(jti, 1, exp).await.unwrap());
        assert!(!tokens.revoke(jti, 1, exp).await.unwrap());
        assert!(tokens.is_revoked(jti).await.unwrap());
    }
}
