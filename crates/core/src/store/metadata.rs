//! Durable metadata store
//!
//! The long-term record of room existence, ownership, and membership.
//! Independent of the live aggregate: the session store may evict a room
//! while its row here survives, and the recovery bridge rebuilds a working
//! aggregate from exactly what this store holds. Room passwords live only
//! here, hashed; the aggregate carries just a `has_password` flag.

use std::path::Path;
use std::sync::Mutex;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{ParticipantRole, Phase, RoomStatus, RoomSummary, Template};

use super::parse::{
    parse_datetime, parse_datetime_opt, parse_uuid, parse_uuid_opt, parse_variant, OptionalExt,
};

/// A database migration
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema",
    sql: r#"
        CREATE TABLE IF NOT EXISTS rooms (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            template TEXT NOT NULL,
            phase TEXT NOT NULL DEFAULT 'SETUP',
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            password_hash TEXT,
            max_postits_per_user INTEGER,
            owner_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            closed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS room_participants (
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            user_id TEXT,
            guest_name TEXT,
            role TEXT NOT NULL,
            is_online INTEGER NOT NULL DEFAULT 0,
            joined_at TEXT NOT NULL,
            UNIQUE (room_id, user_id),
            FOREIGN KEY (room_id) REFERENCES rooms(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_participants_room
            ON room_participants(room_id);
    "#,
}];

/// One roster entry as recorded durably
#[derive(Debug, Clone)]
pub struct ParticipantRecord {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub role: ParticipantRole,
}

/// The durable record of a room, as consumed by the recovery bridge
#[derive(Debug, Clone)]
pub struct RoomMetadata {
    pub id: Uuid,
    pub name: String,
    pub template: Template,
    pub phase: Phase,
    pub status: RoomStatus,
    pub password_hash: Option<String>,
    pub max_postits_per_user: Option<u32>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub participants: Vec<ParticipantRecord>,
}

/// SQLite-backed metadata store
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    /// Open or create the database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let store = Self { conn: Mutex::new(conn) };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Upstream("metadata store lock poisoned".into()))
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )?;
        let current: u32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
                row.get(0)
            })?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            conn.execute_batch(migration.sql)?;
            conn.execute(
                "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.description, Utc::now().to_rfc3339()],
            )?;
            info!(version = migration.version, description = migration.description, "Applied migration");
        }
        Ok(())
    }

    /// Create the durable record for a new room, including its facilitator
    /// roster entry. Returns the room and facilitator participant ids.
    #[instrument(skip(self, password))]
    pub fn create_room_record(
        &self,
        owner_id: Uuid,
        name: &str,
        template: Template,
        password: Option<&str>,
        max_postits_per_user: Option<u32>,
    ) -> Result<(Uuid, Uuid)> {
        let password_hash = password.map(hash_password).transpose()?;
        let room_id = Uuid::new_v4();
        let participant_id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO rooms (id, name, template, phase, status, password_hash, max_postits_per_user, owner_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                room_id.to_string(),
                name,
                template.as_str(),
                Phase::Setup.as_str(),
                RoomStatus::Active.as_str(),
                password_hash,
                max_postits_per_user,
                owner_id.to_string(),
                now,
            ],
        )?;
        conn.execute(
            "INSERT INTO room_participants (id, room_id, user_id, guest_name, role, is_online, joined_at)
             VALUES (?1, ?2, ?3, NULL, ?4, 1, ?5)",
            params![
                participant_id.to_string(),
                room_id.to_string(),
                owner_id.to_string(),
                ParticipantRole::Facilitator.as_str(),
                now,
            ],
        )?;
        Ok((room_id, participant_id))
    }

    /// Fetch a room's durable record with its full roster
    #[instrument(skip(self))]
    pub fn get_room_metadata(&self, room_id: Uuid) -> Result<Option<RoomMetadata>> {
        let conn = self.lock()?;
        let room = conn
            .query_row(
                "SELECT id, name, template, phase, status, password_hash, max_postits_per_user, owner_id, created_at, closed_at
                 FROM rooms WHERE id = ?1",
                params![room_id.to_string()],
                |row| {
                    Ok(RoomMetadata {
                        id: parse_uuid(&row.get::<_, String>(0)?)?,
                        name: row.get(1)?,
                        template: parse_variant(&row.get::<_, String>(2)?, Template::parse, "template")?,
                        phase: parse_variant(&row.get::<_, String>(3)?, Phase::parse, "phase")?,
                        status: parse_variant(&row.get::<_, String>(4)?, RoomStatus::parse, "status")?,
                        password_hash: row.get(5)?,
                        max_postits_per_user: row.get(6)?,
                        owner_id: parse_uuid(&row.get::<_, String>(7)?)?,
                        created_at: parse_datetime(&row.get::<_, String>(8)?)?,
                        closed_at: parse_datetime_opt(row.get::<_, Option<String>>(9)?)?,
                        participants: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut metadata) = room else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT id, user_id, guest_name, role FROM room_participants
             WHERE room_id = ?1 ORDER BY joined_at",
        )?;
        metadata.participants = stmt
            .query_map(params![room_id.to_string()], |row| {
                Ok(ParticipantRecord {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    user_id: parse_uuid_opt(row.get::<_, Option<String>>(1)?)?,
                    guest_name: row.get(2)?,
                    role: parse_variant(&row.get::<_, String>(3)?, ParticipantRole::parse, "role")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(metadata))
    }

    /// Record a roster entry. If an authenticated user already has one in
    /// this room, it is reused (marked online) instead of duplicated.
    /// Returns the durable participant id.
    #[instrument(skip(self))]
    pub fn add_participant(
        &self,
        room_id: Uuid,
        participant_id: Uuid,
        user_id: Option<Uuid>,
        guest_name: Option<&str>,
        role: ParticipantRole,
    ) -> Result<Uuid> {
        let conn = self.lock()?;
        if let Some(user_id) = user_id {
            let existing = conn
                .query_row(
                    "SELECT id FROM room_participants WHERE room_id = ?1 AND user_id = ?2",
                    params![room_id.to_string(), user_id.to_string()],
                    |row| parse_uuid(&row.get::<_, String>(0)?),
                )
                .optional()?;
            if let Some(existing) = existing {
                conn.execute(
                    "UPDATE room_participants SET is_online = 1 WHERE id = ?1",
                    params![existing.to_string()],
                )?;
                return Ok(existing);
            }
        }
        conn.execute(
            "INSERT INTO room_participants (id, room_id, user_id, guest_name, role, is_online, joined_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
            params![
                participant_id.to_string(),
                room_id.to_string(),
                user_id.map(|u| u.to_string()),
                guest_name,
                role.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(participant_id)
    }

    pub fn set_participant_role(&self, participant_id: Uuid, role: ParticipantRole) -> Result<()> {
        self.lock()?.execute(
            "UPDATE room_participants SET role = ?1 WHERE id = ?2",
            params![role.as_str(), participant_id.to_string()],
        )?;
        Ok(())
    }

    pub fn set_participant_online(&self, participant_id: Uuid, is_online: bool) -> Result<()> {
        self.lock()?.execute(
            "UPDATE room_participants SET is_online = ?1 WHERE id = ?2",
            params![is_online, participant_id.to_string()],
        )?;
        Ok(())
    }

    /// Verify a join password. Rooms without a password accept anything.
    pub fn verify_password(&self, room_id: Uuid, candidate: &str) -> Result<bool> {
        let hash: Option<Option<String>> = self
            .lock()?
            .query_row(
                "SELECT password_hash FROM rooms WHERE id = ?1",
                params![room_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match hash {
            None => Err(Error::NotFound(format!("room {room_id}"))),
            Some(None) => Ok(true),
            Some(Some(hash)) => {
                let parsed = PasswordHash::new(&hash)
                    .map_err(|e| Error::Upstream(format!("corrupt password hash: {e}")))?;
                Ok(Argon2::default()
                    .verify_password(candidate.as_bytes(), &parsed)
                    .is_ok())
            }
        }
    }

    /// Sync room status; stamps `closed_at` when closing, clears it otherwise
    pub fn update_status(&self, room_id: Uuid, status: RoomStatus) -> Result<()> {
        let closed_at = (status == RoomStatus::Closed).then(|| Utc::now().to_rfc3339());
        self.lock()?.execute(
            "UPDATE rooms SET status = ?1, closed_at = ?2 WHERE id = ?3",
            params![status.as_str(), closed_at, room_id.to_string()],
        )?;
        Ok(())
    }

    pub fn update_phase(&self, room_id: Uuid, phase: Phase) -> Result<()> {
        self.lock()?.execute(
            "UPDATE rooms SET phase = ?1 WHERE id = ?2",
            params![phase.as_str(), room_id.to_string()],
        )?;
        Ok(())
    }

    /// Permanently remove a room's record; the roster cascades
    #[instrument(skip(self))]
    pub fn delete_room_record(&self, room_id: Uuid) -> Result<()> {
        self.lock()?.execute(
            "DELETE FROM rooms WHERE id = ?1",
            params![room_id.to_string()],
        )?;
        Ok(())
    }

    /// Rooms a user owns or participates in, most recent first
    pub fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<RoomSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.name, r.template, r.status, r.phase, r.created_at, r.closed_at,
                    (SELECT COUNT(*) FROM room_participants p WHERE p.room_id = r.id)
             FROM rooms r
             WHERE r.owner_id = ?1
                OR EXISTS (SELECT 1 FROM room_participants p
                           WHERE p.room_id = r.id AND p.user_id = ?1)
             ORDER BY r.created_at DESC",
        )?;
        let summaries = stmt
            .query_map(params![user_id.to_string()], |row| {
                Ok(RoomSummary {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    name: row.get(1)?,
                    template: parse_variant(&row.get::<_, String>(2)?, Template::parse, "template")?,
                    status: parse_variant(&row.get::<_, String>(3)?, RoomStatus::parse, "status")?,
                    phase: parse_variant(&row.get::<_, String>(4)?, Phase::parse, "phase")?,
                    created_at: parse_datetime(&row.get::<_, String>(5)?)?,
                    closed_at: parse_datetime_opt(row.get::<_, Option<String>>(6)?)?,
                    participant_count: row.get::<_, i64>(7)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(summaries)
    }
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| Error::Upstream(format!("password hashing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_fetch_metadata() {
        let store = MetadataStore::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let (room_id, facilitator_id) = store
            .create_room_record(owner, "sprint 12", Template::Starfish, None, Some(5))
            .unwrap();

        let metadata = store.get_room_metadata(room_id).unwrap().unwrap();
        assert_eq!(metadata.name, "sprint 12");
        assert_eq!(metadata.template, Template::Starfish);
        assert_eq!(metadata.phase, Phase::Setup);
        assert_eq!(metadata.status, RoomStatus::Active);
        assert_eq!(metadata.max_postits_per_user, Some(5));
        assert_eq!(metadata.owner_id, owner);
        assert_eq!(metadata.participants.len(), 1);
        assert_eq!(metadata.participants[0].id, facilitator_id);
        assert_eq!(metadata.participants[0].role, ParticipantRole::Facilitator);
        assert!(metadata.password_hash.is_none());
    }

    #[test]
    fn test_reopen_preserves_records_and_migrations() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("retroboard.db");
        let owner = Uuid::new_v4();

        let store = MetadataStore::open(&path).unwrap();
        let (room_id, _) = store
            .create_room_record(owner, "sprint 12", Template::Classic, None, None)
            .unwrap();
        drop(store);

        // Second open re-runs migrate() against the already-migrated file
        let store = MetadataStore::open(&path).unwrap();
        let metadata = store.get_room_metadata(room_id).unwrap().unwrap();
        assert_eq!(metadata.name, "sprint 12");
        assert_eq!(metadata.owner_id, owner);

        let versions: i64 = store
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_absent_room() {
        let store = MetadataStore::open_in_memory().unwrap();
        assert!(store.get_room_metadata(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_password_verify() {
        let store = MetadataStore::open_in_memory().unwrap();
        let (room_id, _) = store
            .create_room_record(Uuid::new_v4(), "locked", Template::Classic, Some("hunter2"), None)
            .unwrap();

        let metadata = store.get_room_metadata(room_id).unwrap().unwrap();
        assert!(metadata.password_hash.is_some());
        assert!(store.verify_password(room_id, "hunter2").unwrap());
        assert!(!store.verify_password(room_id, "wrong").unwrap());

        // Unprotected rooms accept anything
        let (open_id, _) = store
            .create_room_record(Uuid::new_v4(), "open", Template::Classic, None, None)
            .unwrap();
        assert!(store.verify_password(open_id, "").unwrap());
    }

    #[test]
    fn test_participant_reuse_by_user_id() {
        let store = MetadataStore::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let (room_id, _) = store
            .create_room_record(Uuid::new_v4(), "r", Template::Classic, None, None)
            .unwrap();

        let first = store
            .add_participant(room_id, Uuid::new_v4(), Some(user), None, ParticipantRole::Participant)
            .unwrap();
        let second = store
            .add_participant(room_id, Uuid::new_v4(), Some(user), None, ParticipantRole::Participant)
            .unwrap();
        assert_eq!(first, second);

        // Guests always get fresh entries
        let g1 = store
            .add_participant(room_id, Uuid::new_v4(), None, Some("guest"), ParticipantRole::Participant)
            .unwrap();
        let g2 = store
            .add_participant(room_id, Uuid::new_v4(), None, Some("guest"), ParticipantRole::Participant)
            .unwrap();
        assert_ne!(g1, g2);
    }

    #[test]
    fn test_status_and_phase_sync() {
        let store = MetadataStore::open_in_memory().unwrap();
        let (room_id, _) = store
            .create_room_record(Uuid::new_v4(), "r", Template::Classic, None, None)
            .unwrap();

        store.update_phase(room_id, Phase::Voting).unwrap();
        store.update_status(room_id, RoomStatus::Closed).unwrap();
        let metadata = store.get_room_metadata(room_id).unwrap().unwrap();
        assert_eq!(metadata.phase, Phase::Voting);
        assert_eq!(metadata.status, RoomStatus::Closed);
        assert!(metadata.closed_at.is_some());

        store.update_status(room_id, RoomStatus::Active).unwrap();
        let metadata = store.get_room_metadata(room_id).unwrap().unwrap();
        assert!(metadata.closed_at.is_none());
    }

    #[test]
    fn test_delete_cascades_roster() {
        let store = MetadataStore::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let (room_id, _) = store
            .create_room_record(owner, "r", Template::Classic, None, None)
            .unwrap();
        store.delete_room_record(room_id).unwrap();
        assert!(store.get_room_metadata(room_id).unwrap().is_none());
        assert!(store.rooms_for_user(owner).unwrap().is_empty());
    }

    #[test]
    fn test_rooms_for_user_listing() {
        let store = MetadataStore::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let joiner = Uuid::new_v4();
        let (room_id, _) = store
            .create_room_record(owner, "theirs", Template::Classic, None, None)
            .unwrap();
        store
            .add_participant(room_id, Uuid::new_v4(), Some(joiner), None, ParticipantRole::Participant)
            .unwrap();

        let owned = store.rooms_for_user(owner).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].participant_count, 2);

        let joined = store.rooms_for_user(joiner).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].id, room_id);
    }
}
