//! SQLite persistence: the run record, the event log and snapshots.
//!
//! RULE: Only store.rs issues SQL.
//! The engine calls store methods; subsystems never see the connection.

use rusqlite::{Connection, OptionalExtension, params};
use crate::{
    error::SimResult,
    event::EventLogEntry,
    types::Tick,
};

pub struct SimStore {
    conn: Connection,
}

impl SimStore {
    /// Open (or create) a run database on disk.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Throwaway database for tests and `--db :memory:` runs.
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> SimResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, level: u32, version: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, level, version, started_at) VALUES (?1, ?2, ?3, ?4, 0)",
            params![run_id, seed as i64, level, version],
        )?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    /// `created_at` holds the tick; the log never reads the wall clock.
    pub fn append_event(&self, entry: &EventLogEntry) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, tick, subsystem, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?2)",
            params![entry.run_id, entry.tick, entry.subsystem, entry.event_type, entry.payload],
        )?;
        Ok(())
    }

    pub fn events_for_tick(&self, run_id: &str, tick: Tick) -> SimResult<Vec<EventLogEntry>> {
        self.query_events(
            "SELECT id, run_id, tick, subsystem, event_type, payload FROM event_log
             WHERE run_id = ?1 AND tick = ?2 ORDER BY id",
            params![run_id, tick],
        )
    }

    /// Every event of a run, in the order it was written. A rewound and
    /// replayed tick appears once per pass.
    pub fn events_for_run(&self, run_id: &str) -> SimResult<Vec<EventLogEntry>> {
        self.query_events(
            "SELECT id, run_id, tick, subsystem, event_type, payload FROM event_log
             WHERE run_id = ?1 ORDER BY id",
            params![run_id],
        )
    }

    fn query_events(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(args, |row| {
            Ok(EventLogEntry {
                id:         Some(row.get(0)?),
                run_id:     row.get(1)?,
                tick:       row.get(2)?,
                subsystem:  row.get(3)?,
                event_type: row.get(4)?,
                payload:    row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_events_of_type(&self, run_id: &str, event_type: &str) -> SimResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Per-type totals, most frequent first. Tick bookkeeping is left out.
    pub fn event_type_counts(&self, run_id: &str) -> SimResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_type, COUNT(*) AS n FROM event_log
             WHERE run_id = ?1 AND event_type NOT IN ('tick_started', 'tick_completed')
             GROUP BY event_type ORDER BY n DESC, event_type",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ── Snapshot ───────────────────────────────────────────────

    /// A replayed tick overwrites the snapshot taken on the earlier pass.
    pub fn save_snapshot(&self, run_id: &str, tick: Tick, state_json: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO snapshot (run_id, tick, state_json) VALUES (?1, ?2, ?3)",
            params![run_id, tick, state_json],
        )?;
        Ok(())
    }

    /// Newest snapshot at or before `tick`.
    pub fn latest_snapshot_before(
        &self,
        run_id: &str,
        tick: Tick,
    ) -> SimResult<Option<(Tick, String)>> {
        let found = self
            .conn
            .query_row(
                "SELECT tick, state_json FROM snapshot
                 WHERE run_id = ?1 AND tick <= ?2
                 ORDER BY tick DESC LIMIT 1",
                params![run_id, tick],
                |row| Ok((row.get::<_, Tick>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(found)
    }

    /// Drop snapshots of a future that a rewound player has changed.
    /// Returns how many were removed.
    pub fn discard_snapshots_after(&self, run_id: &str, tick: Tick) -> SimResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM snapshot WHERE run_id = ?1 AND tick > ?2",
            params![run_id, tick],
        )?;
        Ok(removed)
    }
}
