//! LanceDB connection wrapper.
//!
//! Owns one `lancedb::Connection` rooted at a directory under the data dir
//! and handles table lifecycle. Record mapping lives in [`super::store`].

use std::path::{Path, PathBuf};

use arrow_schema::SchemaRef;

/// A LanceDB database on the local filesystem.
pub struct LanceVectorStore {
    db: lancedb::Connection,
    base_path: PathBuf,
}

impl LanceVectorStore {
    /// Open or create a LanceDB database at `base_path`, creating the directory.
    pub async fn open(base_path: PathBuf) -> Result<Self, lancedb::Error> {
        tokio::fs::create_dir_all(&base_path)
            .await
            .map_err(|e| lancedb::Error::CreateDir {
                path: base_path.display().to_string(),
                source: e,
            })?;

        let uri = base_path.to_str().ok_or_else(|| lancedb::Error::InvalidInput {
            message: format!("Path contains invalid UTF-8: {}", base_path.display()),
        })?;

        let db = lancedb::connect(uri).execute().await?;
        tracing::debug!(path = %base_path.display(), "Vector store opened");

        Ok(Self { db, base_path })
    }

    /// Open `table_name`, creating it empty with `schema` if it does not exist.
    pub async fn ensure_table(
        &self,
        table_name: &str,
        schema: SchemaRef,
    ) -> Result<lancedb::Table, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                self.db
                    .create_empty_table(table_name, schema)
                    .execute()
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Open `table_name` if it exists.
    pub async fn open_table(&self, table_name: &str) -> Result<Option<lancedb::Table>, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(Some(table)),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn table_names(&self) -> Result<Vec<String>, lancedb::Error> {
        self.db.table_names().execute().await
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
