use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};

use crate::events::{FallEvent, FallObserver, ObserverError};

/// Fila de la tabla de eventos
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub event_id: String,
    pub confirmed_at: f64,
    pub recovered_at: Option<f64>,
    pub notification_count: u32,
    pub clip_path: Option<String>,
}

fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Bitácora persistente de caídas confirmadas, respaldada en SQLite.
///
/// Observador de caídas por omisión: inserta al confirmar, marca la
/// recuperación, y recibe del grabador la ruta del clip cuando el archivo
/// aterriza. La conexión va tras un Mutex para poder consultarla desde
/// hilos de fondo (el grabador corre fuera del hilo de detección).
pub struct EventLogger {
    conn: Mutex<Connection>,
}

impl EventLogger {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(db_path)?;
        let logger = Self {
            conn: Mutex::new(conn),
        };
        logger.create_tables()?;
        Ok(logger)
    }

    /// Base en memoria, para pruebas
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let logger = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        logger.create_tables()?;
        Ok(logger)
    }

    fn create_tables(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS events (
                event_id TEXT PRIMARY KEY,
                confirmed_at REAL NOT NULL,
                recovered_at REAL,
                notification_count INTEGER DEFAULT 1,
                clip_path TEXT,
                created_at REAL NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn record_confirmed(&self, event: &FallEvent) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO events
             (event_id, confirmed_at, notification_count, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.event_id,
                event.confirmed_at,
                event.notification_count,
                wall_clock()
            ],
        )?;
        Ok(())
    }

    pub fn record_recovered(&self, event: &FallEvent) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE events SET recovered_at = ?1 WHERE event_id = ?2",
            params![wall_clock(), event.event_id],
        )?;
        Ok(())
    }

    /// El grabador informa aquí la ruta del clip una vez escrito
    pub fn update_clip_path(&self, event_id: &str, clip_path: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE events SET clip_path = ?1 WHERE event_id = ?2",
            params![clip_path, event_id],
        )?;
        Ok(())
    }

    pub fn recent_events(&self, limit: usize) -> Result<Vec<EventRow>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT event_id, confirmed_at, recovered_at, notification_count, clip_path
             FROM events
             ORDER BY confirmed_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(EventRow {
                    event_id: row.get(0)?,
                    confirmed_at: row.get(1)?,
                    recovered_at: row.get(2)?,
                    notification_count: row.get(3)?,
                    clip_path: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_event(&self, event_id: &str) -> Result<Option<EventRow>, rusqlite::Error> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT event_id, confirmed_at, recovered_at, notification_count, clip_path
             FROM events WHERE event_id = ?1",
            params![event_id],
            |row| {
                Ok(EventRow {
                    event_id: row.get(0)?,
                    confirmed_at: row.get(1)?,
                    recovered_at: row.get(2)?,
                    notification_count: row.get(3)?,
                    clip_path: row.get(4)?,
                })
            },
        )
        .optional()
    }
}

impl FallObserver for Arc<EventLogger> {
    fn on_fall_confirmed(&mut self, event: &FallEvent) -> Result<(), ObserverError> {
        self.record_confirmed(event)?;
        Ok(())
    }

    fn on_fall_recovered(&mut self, event: &FallEvent) -> Result<(), ObserverError> {
        self.record_recovered(event)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str, confirmed_at: f64, count: u32) -> FallEvent {
        FallEvent {
            event_id: id.to_string(),
            confirmed_at,
            last_notified_at: confirmed_at,
            notification_count: count,
        }
    }

    #[test]
    fn confirm_inserts_row() {
        let logger = EventLogger::open_in_memory().unwrap();
        logger.record_confirmed(&event("evt_3", 3.0, 1)).unwrap();

        let row = logger.get_event("evt_3").unwrap().unwrap();
        assert_eq!(row.confirmed_at, 3.0);
        assert_eq!(row.notification_count, 1);
        assert!(row.recovered_at.is_none());
        assert!(row.clip_path.is_none());
    }

    #[test]
    fn re_notify_replaces_count() {
        let logger = EventLogger::open_in_memory().unwrap();
        logger.record_confirmed(&event("evt_3", 3.0, 1)).unwrap();
        logger.record_confirmed(&event("evt_3", 3.0, 2)).unwrap();

        let row = logger.get_event("evt_3").unwrap().unwrap();
        assert_eq!(row.notification_count, 2);
    }

    #[test]
    fn recovery_sets_timestamp() {
        let logger = EventLogger::open_in_memory().unwrap();
        let e = event("evt_9", 9.0, 1);
        logger.record_confirmed(&e).unwrap();
        logger.record_recovered(&e).unwrap();

        let row = logger.get_event("evt_9").unwrap().unwrap();
        assert!(row.recovered_at.is_some());
    }

    #[test]
    fn clip_path_lands_after_write() {
        let logger = EventLogger::open_in_memory().unwrap();
        logger.record_confirmed(&event("evt_5", 5.0, 1)).unwrap();
        logger
            .update_clip_path("evt_5", "data/clips/20250601_120000_evt_5.mp4")
            .unwrap();

        let row = logger.get_event("evt_5").unwrap().unwrap();
        assert_eq!(
            row.clip_path.as_deref(),
            Some("data/clips/20250601_120000_evt_5.mp4")
        );
    }

    #[test]
    fn recent_events_ordered_by_confirmation() {
        let logger = EventLogger::open_in_memory().unwrap();
        logger.record_confirmed(&event("evt_1", 1.0, 1)).unwrap();
        logger.record_confirmed(&event("evt_50", 50.0, 1)).unwrap();
        logger.record_confirmed(&event("evt_20", 20.0, 1)).unwrap();

        let rows = logger.recent_events(2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event_id, "evt_50");
        assert_eq!(rows[1].event_id, "evt_20");
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");

        {
            let logger = EventLogger::open(&path).unwrap();
            logger.record_confirmed(&event("evt_7", 7.0, 1)).unwrap();
        }

        let logger = EventLogger::open(&path).unwrap();
        assert!(logger.get_event("evt_7").unwrap().is_some());
    }
}
