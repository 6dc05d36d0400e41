use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use tracing::info;

use crate::data::seed::Seed;
use crate::store::{Store, sqlite::SqliteStore};

/// Creates an empty portal database.
pub fn init(db: &Path) -> Result<()> {
    ensure!(!db.exists(), "database already exists at {:?}", db);

    let store = SqliteStore::open(db)
        .with_context(|| format!("could not create sqlite DB at {:?}", db))?;
    store.init().context("could not create schema")?;

    info!(db = %db.display(), "database initialised");
    Ok(())
}

/// Loads the seed directory into a fresh database.
pub fn run(source: &Path, db: &Path) -> Result<()> {
    ensure!(!db.exists(), "database already exists at {:?}", db);

    let seed = match Seed::load(source) {
        Ok(seed) => seed,
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            bail!("could not load seed data from {:?}", source);
        }
    };

    let store = SqliteStore::open(db)
        .with_context(|| format!("could not create sqlite DB at {:?}", db))?;
    store.init().context("could not create schema")?;
    store.import(&seed).context("could not import seed data")?;

    info!(
        reports = seed.reports.len(),
        departments = seed.departments.len(),
        notifications = seed.notifications.len(),
        groups = seed.groups.len(),
        accounts = seed.accounts.len(),
        "seed imported"
    );

    let imported = store.reports().context("could not read back reports")?;
    ensure!(
        imported.len() == seed.reports.len(),
        "expected {} reports, found {}",
        seed.reports.len(),
        imported.len()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_dir() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("seed")
    }

    #[test]
    fn test_import_bundled_seed() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("portal.db");

        run(&seed_dir(), &db).unwrap();

        let store = SqliteStore::open(&db).unwrap();
        assert_eq!(store.departments().unwrap().len(), 4);
        assert!(store.account("admin@municipality.gov").unwrap().is_some());
    }

    #[test]
    fn test_refuses_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("portal.db");

        init(&db).unwrap();
        assert!(init(&db).is_err());
        assert!(run(&seed_dir(), &db).is_err());
    }
}
