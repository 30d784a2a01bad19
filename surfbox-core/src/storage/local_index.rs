use crate::error::{Result, SurfError};
use crate::model::{DOWNLOAD_TEMP_SUFFIX, FileInfoMap, FileMeta, HashList};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};

/// File name of the persisted index inside the synchronized directory.
pub const INDEX_FILENAME: &str = "index.db";

/// Row index used for the marker row of a file with zero blocks.
const EMPTY_FILE_MARKER: i64 = -1;

/// LocalIndex persists the client's last known file -> version -> hashes
/// mapping between sync passes, one row per block.
pub struct LocalIndex {
    db_path: PathBuf,
    staging_path: PathBuf,
}

impl LocalIndex {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            db_path: base_dir.join(INDEX_FILENAME),
            staging_path: base_dir.join(format!("{}{}", INDEX_FILENAME, DOWNLOAD_TEMP_SUFFIX)),
        }
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS indexes (
                file_name TEXT NOT NULL,
                version INTEGER NOT NULL,
                hash_index INTEGER NOT NULL,
                hash_value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Load the persisted index. A missing index file is an empty index.
    pub fn load(&self) -> Result<FileInfoMap> {
        let mut index = FileInfoMap::new();
        if !self.db_path.exists() {
            return Ok(index);
        }

        let conn = Connection::open(&self.db_path)?;
        Self::init_schema(&conn)?;

        let mut stmt = conn.prepare(
            "SELECT file_name, version, hash_index, hash_value
             FROM indexes ORDER BY file_name, hash_index",
        )?;

        let rows = stmt.query_map([], |row| {
            let file_name: String = row.get(0)?;
            let version: i64 = row.get(1)?;
            let hash_index: i64 = row.get(2)?;
            let hash_value: String = row.get(3)?;
            Ok((file_name, version, hash_index, hash_value))
        })?;

        let mut grouped: Vec<(String, u64, Vec<String>)> = Vec::new();
        for row in rows {
            let (file_name, version, hash_index, hash_value) = row?;
            let start_new = grouped
                .last()
                .map(|(name, _, _)| name != &file_name)
                .unwrap_or(true);
            if start_new {
                grouped.push((file_name, version.max(0) as u64, Vec::new()));
            }
            if hash_index != EMPTY_FILE_MARKER
                && let Some((_, _, hashes)) = grouped.last_mut()
            {
                hashes.push(hash_value);
            }
        }

        for (file_name, version, hashes) in grouped {
            let meta = FileMeta {
                filename: file_name.clone(),
                version,
                hashes: HashList::from_wire(hashes)?,
            };
            index.insert(file_name, meta);
        }

        tracing::debug!(
            "Loaded {} entries from {}",
            index.len(),
            self.db_path.display()
        );
        Ok(index)
    }

    /// Replace the persisted index wholesale with `index`.
    ///
    /// The new index is built in a staging file and renamed over the old
    /// one, so a crash leaves either the previous or the new index.
    pub fn write(&self, index: &FileInfoMap) -> Result<()> {
        if self.staging_path.exists() {
            std::fs::remove_file(&self.staging_path)?;
        }

        Self::write_rows(&self.staging_path, index)?;
        std::fs::rename(&self.staging_path, &self.db_path)?;

        tracing::debug!(
            "Wrote {} entries to {}",
            index.len(),
            self.db_path.display()
        );
        Ok(())
    }

    fn write_rows(path: &Path, index: &FileInfoMap) -> Result<()> {
        let mut conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        let tx = conn.transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO indexes (file_name, version, hash_index, hash_value)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;

            for meta in index.values() {
                let version = i64::try_from(meta.version).map_err(|_| {
                    SurfError::InvalidRequest(format!(
                        "version {} of {} is out of range",
                        meta.version, meta.filename
                    ))
                })?;
                let entries = meta.hashes.clone().into_wire();
                if entries.is_empty() {
                    insert.execute(params![meta.filename, version, EMPTY_FILE_MARKER, ""])?;
                    continue;
                }
                for (hash_index, hash_value) in entries.iter().enumerate() {
                    insert.execute(params![
                        meta.filename,
                        version,
                        hash_index as i64,
                        hash_value
                    ])?;
                }
            }
        }
        tx.commit()?;
        conn.close().map_err(|(_, e)| SurfError::Database(e))?;
        Ok(())
    }
}
