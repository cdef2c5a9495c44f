use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, warn};

use shared::config::server::DatabaseConfig;

const STAGES: [ScriptStage; 2] = [ScriptStage::Schema, ScriptStage::Indexes];

#[derive(Debug, Clone, Copy)]
enum ScriptStage {
    Schema,
    Indexes,
}

impl ScriptStage {
    fn label(self) -> &'static str {
        match self {
            ScriptStage::Schema => "schema",
            ScriptStage::Indexes => "indexes",
        }
    }
}

impl std::fmt::Display for ScriptStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database bootstrap directory does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("database bootstrap stage '{stage}' missing at {path}")]
    MissingStage { stage: &'static str, path: PathBuf },
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("database error executing {path}: {source}")]
    Sql {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },
}

/// Applies the `schema/` then `indexes/` scripts under the bootstrap path,
/// each stage in file-name order. Scripts must be idempotent.
///
/// # Errors
/// Returns [`BootstrapError`] when a directory is missing or unreadable or a
/// script fails.
pub async fn run(pool: &PgPool, config: &DatabaseConfig) -> Result<(), BootstrapError> {
    let plan = plan(&config.bootstrap_path)?;
    info!(path = %config.bootstrap_path.display(), "running database bootstrap");

    for (stage, files) in plan {
        if files.is_empty() {
            debug!(stage = %stage, "no bootstrap scripts found for stage");
            continue;
        }

        info!(stage = %stage, count = files.len(), "applying bootstrap scripts");
        for path in files {
            apply_script(pool, &path).await?;
        }
    }

    Ok(())
}

fn plan(root: &Path) -> Result<Vec<(ScriptStage, Vec<PathBuf>)>, BootstrapError> {
    if !root.exists() {
        return Err(BootstrapError::MissingRoot(root.to_path_buf()));
    }

    STAGES
        .iter()
        .map(|&stage| {
            let stage_path = root.join(stage.label());
            if !stage_path.exists() {
                return Err(BootstrapError::MissingStage {
                    stage: stage.label(),
                    path: stage_path,
                });
            }
            Ok((stage, collect_sql_files(&stage_path)?))
        })
        .collect()
}

/// Startup connectivity check.
///
/// # Errors
/// Returns the driver error when the database cannot be reached.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Ready once both tables exist.
///
/// # Errors
/// Returns the driver error when the query fails or a table is missing.
pub async fn ensure_readiness(pool: &PgPool) -> Result<(), sqlx::Error> {
    let ready: bool = sqlx::query_scalar(
        "SELECT to_regclass('public.messages') IS NOT NULL \
         AND to_regclass('public.users') IS NOT NULL",
    )
    .fetch_one(pool)
    .await?;

    if ready {
        Ok(())
    } else {
        Err(sqlx::Error::Protocol("schema has not been bootstrapped".into()))
    }
}

fn collect_sql_files(dir: &Path) -> Result<Vec<PathBuf>, BootstrapError> {
    let mut entries = Vec::new();
    let read_dir = fs::read_dir(dir).map_err(|source| BootstrapError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in read_dir {
        let entry = entry.map_err(|source| BootstrapError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
        {
            entries.push(path);
        }
    }

    entries.sort_by(|a, b| compare_paths(a, b));
    Ok(entries)
}

fn compare_paths(a: &Path, b: &Path) -> Ordering {
    match (a.file_name(), b.file_name()) {
        (Some(a_name), Some(b_name)) => a_name.cmp(b_name),
        _ => Ordering::Equal,
    }
}

async fn apply_script(pool: &PgPool, path: &Path) -> Result<(), BootstrapError> {
    let sql = fs::read_to_string(path).map_err(|source| BootstrapError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    let trimmed = sql.trim();
    if trimmed.is_empty() {
        warn!(path = %path.display(), "skipping empty bootstrap script");
        return Ok(());
    }

    let mut transaction = pool.begin().await.map_err(|source| BootstrapError::Sql {
        path: path.to_path_buf(),
        source,
    })?;

    info!(script = %path.display(), "executing bootstrap script");
    if let Err(source) = sqlx::query(trimmed).execute(&mut *transaction).await {
        return Err(BootstrapError::Sql {
            path: path.to_path_buf(),
            source,
        });
    }

    transaction
        .commit()
        .await
        .map_err(|source| BootstrapError::Sql {
            path: path.to_path_buf(),
            source,
        })
}
