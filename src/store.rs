use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::models::{User, UserRow};
use crate::Error;

/// Persistence boundary for user documents.
///
/// Every call is an independent round trip. `replace` has no version check, so two
/// concurrent edits of one user's task list race and the later write wins.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    async fn find_all(&self) -> Result<Vec<User>, Error>;

    async fn insert(&self, user: &User) -> Result<(), Error>;

    async fn replace(&self, user: &User) -> Result<(), Error>;

    async fn delete(&self, email: &str) -> Result<(), Error>;

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<(), Error>;
}

pub struct PgStore {
    pg: PgPool,
}

impl PgStore {
    pub fn new(pg: PgPool) -> Self {
        Self { pg }
    }

    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                email TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                tasks JSONB NOT NULL DEFAULT '[]'::jsonb
            )",
        )
        .execute(&self.pg)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1 LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pg)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_all(&self) -> Result<Vec<User>, Error> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users")
            .fetch_all(&self.pg)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn insert(&self, user: &User) -> Result<(), Error> {
        let res = sqlx::query(
            "INSERT INTO users VALUES ($1, $2, $3) ON CONFLICT (email) DO NOTHING",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(Json(&user.tasks))
        .execute(&self.pg)
        .await?;

        if res.rows_affected() < 1 {
            return Err(Error::UserAlreadyExists {
                message: format!("User with email `{}` already exists!", user.email),
            });
        }
        Ok(())
    }

    async fn replace(&self, user: &User) -> Result<(), Error> {
        let res = sqlx::query("UPDATE users SET password_hash = $2, tasks = $3 WHERE email = $1")
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(Json(&user.tasks))
            .execute(&self.pg)
            .await?;

        if res.rows_affected() < 1 {
            return Err(Error::no_user(&user.email));
        }
        Ok(())
    }

    async fn delete(&self, email: &str) -> Result<(), Error> {
        let res = sqlx::query("DELETE FROM users WHERE email = $1")
            .bind(email)
            .execute(&self.pg)
            .await?;

        if res.rows_affected() < 1 {
            return Err(Error::no_user(email));
        }
        Ok(())
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<(), Error> {
        let res = sqlx::query("UPDATE users SET password_hash = $2 WHERE email = $1")
            .bind(email)
            .bind(password_hash)
            .execute(&self.pg)
            .await?;

        if res.rows_affected() < 1 {
            return Err(Error::no_user(email));
        }
        Ok(())
    }
}

/// Process-local store, lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<BTreeMap<String, User>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn find_all(&self) -> Result<Vec<User>, Error> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn insert(&self, user: &User) -> Result<(), Error> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(Error::UserAlreadyExists {
                message: format!("User with email `{}` already exists!", user.email),
            });
        }
        users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn replace(&self, user: &User) -> Result<(), Error> {
        match self.users.write().await.get_mut(&user.email) {
            Some(slot) => {
                *slot = user.clone();
                Ok(())
            }
            None => Err(Error::no_user(&user.email)),
        }
    }

    async fn delete(&self, email: &str) -> Result<(), Error> {
        self.users
            .write()
            .await
            .remove(email)
            .map(|_| ())
            .ok_or_else(|| Error::no_user(email))
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<(), Error> {
        match self.users.write().await.get_mut(email) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(())
            }
            None => Err(Error::no_user(email)),
        }
    }
}
