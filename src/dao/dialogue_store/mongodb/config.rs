use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "dialolical";
const APP_NAME: &str = "dialolical-back";
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings of the MongoDB dialogue store.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri` and pick the database, `dialolical` unless `db_name` says otherwise.
    ///
    /// Values set in the URI win over the defaults applied here.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
        options
            .server_selection_timeout
            .get_or_insert(SERVER_SELECTION_TIMEOUT);

        let database_name = db_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or(options.default_database.as_deref())
            .unwrap_or(DEFAULT_DATABASE)
            .to_owned();

        Ok(Self {
            options,
            database_name,
        })
    }
}
