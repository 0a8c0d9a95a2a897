use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::{
    repo::{StoreError, UserStore},
    repo_types::{NewUser, Role, User, UserChanges},
};

/// Store backed by a map; mirrors the unique-email rule of the real table.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(mut users: Vec<User>) -> Vec<User> {
        users.sort_by_key(|u| u.created_at);
        users
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            age: user.age,
            gender: user.gender,
            role: user.role,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(age) = changes.age {
            user.age = age;
        }
        if let Some(gender) = changes.gender {
            user.gender = gender;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(active) = changes.is_active {
            user.is_active = active;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn record_login(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().unwrap();
        Ok(users.get_mut(&id).map(|user| {
            let now = OffsetDateTime::now_utc();
            user.last_login = Some(now);
            user.updated_at = now;
            user.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.users.lock().unwrap().remove(&id).is_some())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(Self::sorted(users.values().cloned().collect()))
    }

    async fn list_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(Self::sorted(
            users.values().filter(|u| u.role == role).cloned().collect(),
        ))
    }
}
