use anyhow::Context;
use async_trait::async_trait;
use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, IndexModel,
};

use crate::models::{AuthProvider, User};
use crate::repository::{StoreError, UserStore};

/// Used when `MONGO_URI` does not name a database.
const DEFAULT_DATABASE: &str = "auth";
const USERS_COLLECTION: &str = "users";
const DUPLICATE_KEY: i32 = 11000;

pub struct MongoUserStore {
    users: Collection<User>,
}

impl MongoUserStore {
    /// Connect, ping and make sure the unique indexes exist.
    ///
    /// The driver connects lazily, so the ping is what makes a bad URI or an
    /// unreachable server fail at startup instead of on the first request.
    pub async fn connect(uri: &str) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .context("Failed to parse MONGO_URI")?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));

        database
            .run_command(doc! { "ping": 1 })
            .await
            .context("Failed to reach MongoDB")?;

        let store = Self {
            users: database.collection(USERS_COLLECTION),
        };
        store.ensure_indexes().await?;

        tracing::info!("Connected to MongoDB database '{}'", database.name());
        Ok(store)
    }

    async fn ensure_indexes(&self) -> anyhow::Result<()> {
        let local_username = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(
                IndexOptions::builder()
                    .name("local_username_unique".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "provider": AuthProvider::Local.as_str() })
                    .build(),
            )
            .build();

        let provider_subject = IndexModel::builder()
            .keys(doc! { "provider": 1, "provider_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("provider_subject_unique".to_string())
                    .unique(true)
                    .partial_filter_expression(doc! { "provider_id": { "$type": "string" } })
                    .build(),
            )
            .build();

        self.users
            .create_indexes([local_username, provider_subject])
            .await
            .context("Failed to create user indexes")?;

        Ok(())
    }
}

fn map_insert_error(err: mongodb::error::Error, identity: &str) -> StoreError {
    if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = err.kind.as_ref() {
        if write_error.code == DUPLICATE_KEY {
            return StoreError::Duplicate(identity.to_string());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        self.users
            .insert_one(user)
            .await
            .map_err(|e| map_insert_error(e, &user.username))?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.find_one(doc! { "_id": id }).await?)
    }

    async fn find_local(&self, username: &str) -> Result<Option<User>, StoreError> {
        let filter = doc! {
            "provider": AuthProvider::Local.as_str(),
            "username": username,
        };
        Ok(self.users.find_one(filter).await?)
    }

    async fn find_by_provider(
        &self,
        provider: AuthProvider,
        subject: &str,
    ) -> Result<Option<User>, StoreError> {
        let filter = doc! {
            "provider": provider.as_str(),
            "provider_id": subject,
        };
        Ok(self.users.find_one(filter).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::error::{Error, WriteError};

    fn write_error(code: i32) -> Error {
        let write_error: WriteError =
            mongodb::bson::from_document(doc! { "code": code, "errmsg": "E11000" }).unwrap();
        Error::from(ErrorKind::Write(WriteFailure::WriteError(write_error)))
    }

    #[test]
    fn test_duplicate_key_maps_to_duplicate() {
        let err = map_insert_error(write_error(DUPLICATE_KEY), "alice");
        assert!(matches!(err, StoreError::Duplicate(name) if name == "alice"));
    }

    #[test]
    fn test_other_errors_stay_database_errors() {
        assert!(matches!(
            map_insert_error(write_error(121), "alice"),
            StoreError::Database(_)
        ));

        let io = Error::from(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timed out",
        ));
        assert!(matches!(
            map_insert_error(io, "alice"),
            StoreError::Database(_)
        ));
    }
}
