use log::info;
use rusqlite::Connection;

use crate::WorkingDirectory;

pub fn open_db(wd: &WorkingDirectory) -> rusqlite::Result<Connection> {
    let path = wd.path.join("tsp-launcher.db");
    if !path.exists() { info!("Creating new database {}", path.display()) }
    let conn = Connection::open(&path)?;

    static SCHEMA: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/db/schema.sql"));
    conn.execute(SCHEMA, [])?;

    Ok(conn)
}

/// Run `f` inside a save point, releasing it on success and rolling back on error
pub fn with_savepoint<T>(conn: &Connection, name: &str, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> rusqlite::Result<T> {
    conn.execute(&format!("SAVEPOINT {name}"), [])?;
    match f(conn) {
        Ok(value) => {
            conn.execute(&format!("RELEASE {name}"), [])?;
            Ok(value)
        }
        Err(err) => {
            info!("Rolling back save point {name}");
            conn.execute(&format!("ROLLBACK TO {name}"), [])?;
            conn.execute(&format!("RELEASE {name}"), [])?;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn creates_database_once() {
        let dir = tempdir().unwrap();
        let wd = WorkingDirectory { path: dir.path().to_path_buf() };
        open_db(&wd).unwrap();
        assert!(dir.path().join("tsp-launcher.db").exists());
        // schema uses IF NOT EXISTS so reopening is fine
        open_db(&wd).unwrap();
    }

    #[test]
    fn failed_savepoint_leaves_no_rows() {
        let dir = tempdir().unwrap();
        let conn = open_db(&WorkingDirectory { path: dir.path().to_path_buf() }).unwrap();

        let result: rusqlite::Result<()> = with_savepoint(&conn, "test", |conn| {
            conn.execute("INSERT INTO run (batch, run_name, curriculum, launched_at) VALUES ('b', 'a', 1, 'now')", [])?;
            conn.execute("INSERT INTO run (batch, run_name, curriculum, launched_at) VALUES ('b', 'a', 2, 'now')", [])?;
            Ok(())
        });
        assert!(result.is_err());

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM run", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 0);
    }
}
