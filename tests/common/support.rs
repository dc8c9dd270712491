use failure::Error;

use super::db::{Connection, Database};

/// Run a test against the suite's database, skipping it cleanly when no
/// database is configured.
pub fn run<F>(database: &'static Option<Database>, test: F)
where
    F: FnOnce(&Connection) -> Result<(), Error>,
{
    let database = match database {
        Some(database) => database,
        None => {
            eprintln!("TEST_DATABASE_URL not set; skipping");
            return;
        }
    };

    database.lock(|pool| {
        let db = pool.get()?;
        test(&*db)
    }).expect("test failed");
}
