//! Working drafts: unsaved attendance selections for one (class, date), held in
//! memory per owner until an explicit commit writes them as a batch.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::attendance::{self, BatchEntry, BatchReceipt, BatchSubmission};
use crate::error::{AppError, AppResult};
use crate::model::{parse_date, AttendanceStatus};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DraftKey {
    owner: String,
    class_id: String,
    date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct Draft {
    pub class_id: String,
    pub date: NaiveDate,
    /// roll number -> status
    pub marks: BTreeMap<String, AttendanceStatus>,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftInput {
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub marks: BTreeMap<String, String>,
}

/// Identifies one draft for lookup, discard and commit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftScope {
    #[serde(default)]
    pub class_id: String,
    #[serde(default)]
    pub date: String,
}

fn key_for(owner: &str, class_id: &str, date: &str) -> AppResult<DraftKey> {
    let class_id = class_id.trim();
    if class_id.is_empty() {
        return Err(AppError::Validation("missing class_id".to_string()));
    }
    Ok(DraftKey {
        owner: owner.to_string(),
        class_id: class_id.to_string(),
        date: parse_date(date)?,
    })
}

#[derive(Default)]
pub struct DraftStore {
    drafts: Mutex<HashMap<DraftKey, Draft>>,
    next_revision: Mutex<u64>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<DraftKey, Draft>>> {
        self.drafts.lock().map_err(|_| AppError::Internal)
    }

    fn bump_revision(&self) -> AppResult<u64> {
        let mut r = self.next_revision.lock().map_err(|_| AppError::Internal)?;
        *r += 1;
        Ok(*r)
    }

    /// Saves a draft, replacing any earlier draft for the same owner, class and date.
    pub fn save(&self, owner: &str, input: &DraftInput) -> AppResult<Draft> {
        let key = key_for(owner, &input.class_id, &input.date)?;
        let mut marks = BTreeMap::new();
        for (roll, status) in &input.marks {
            let roll = roll.trim();
            if roll.is_empty() {
                return Err(AppError::Validation("draft has an empty roll number".to_string()));
            }
            marks.insert(roll.to_string(), status.parse::<AttendanceStatus>()?);
        }
        let draft = Draft {
            class_id: key.class_id.clone(),
            date: key.date,
            marks,
            revision: self.bump_revision()?,
            updated_at: Utc::now(),
        };
        debug!(owner, class_id = %draft.class_id, date = %draft.date, marks = draft.marks.len(), "draft saved");
        self.lock()?.insert(key, draft.clone());
        Ok(draft)
    }

    pub fn get(&self, owner: &str, scope: &DraftScope) -> AppResult<Option<Draft>> {
        let key = key_for(owner, &scope.class_id, &scope.date)?;
        Ok(self.lock()?.get(&key).cloned())
    }

    /// Returns whether a draft existed.
    pub fn discard(&self, owner: &str, scope: &DraftScope) -> AppResult<bool> {
        let key = key_for(owner, &scope.class_id, &scope.date)?;
        Ok(self.lock()?.remove(&key).is_some())
    }

    /// Writes the draft through the batch path. The draft is dropped only after the
    /// batch commits, and only if nobody saved a newer revision meanwhile.
    pub fn commit(&self, conn: &Connection, owner: &str, scope: &DraftScope) -> AppResult<BatchReceipt> {
        let key = key_for(owner, &scope.class_id, &scope.date)?;
        let draft = self
            .lock()?
            .get(&key)
            .cloned()
            .ok_or_else(|| AppError::NotFound("no draft for this class and date".to_string()))?;

        let batch = BatchSubmission {
            class_id: draft.class_id.clone(),
            date: draft.date.format("%Y-%m-%d").to_string(),
            entries: draft
                .marks
                .iter()
                .map(|(roll, status)| BatchEntry {
                    student_id: None,
                    roll_number: Some(roll.clone()),
                    status: status.as_str().to_string(),
                })
                .collect(),
        };
        let receipt = attendance::submit_batch(conn, &batch)?;

        let mut drafts = self.lock()?;
        if drafts.get(&key).map(|d| d.revision) == Some(draft.revision) {
            drafts.remove(&key);
        }
        info!(owner, batch_id = %receipt.batch_id, "draft committed");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::NewStudent;
    use crate::students;

    fn input(marks: &[(&str, &str)]) -> DraftInput {
        DraftInput {
            class_id: "CS101".into(),
            date: "2024-02-01".into(),
            marks: marks.iter().map(|(r, s)| (r.to_string(), s.to_string())).collect(),
        }
    }

    fn scope() -> DraftScope {
        DraftScope {
            class_id: "CS101".into(),
            date: "2024-02-01".into(),
        }
    }

    fn seed(conn: &Connection, roll: &str) {
        students::create_student(
            conn,
            &NewStudent {
                name: format!("Student {}", roll),
                roll_number: roll.into(),
                email: None,
                department: "CS".into(),
            },
        )
        .expect("seed");
    }

    #[test]
    fn save_overwrites_same_scope() {
        let store = DraftStore::new();
        store.save("t1", &input(&[("R001", "present")])).expect("first");
        store.save("t1", &input(&[("R001", "absent"), ("R002", "present")])).expect("second");
        let d = store.get("t1", &scope()).expect("get").expect("draft");
        assert_eq!(d.marks.len(), 2);
        assert_eq!(d.marks["R001"], AttendanceStatus::Absent);
    }

    #[test]
    fn drafts_are_private_per_owner() {
        let store = DraftStore::new();
        store.save("t1", &input(&[("R001", "present")])).expect("save");
        assert!(store.get("t2", &scope()).expect("get").is_none());
    }

    #[test]
    fn invalid_status_is_rejected() {
        let store = DraftStore::new();
        let e = store.save("t1", &input(&[("R001", "late")])).expect_err("late");
        assert_eq!(e.code(), "VALIDATION");
    }

    #[test]
    fn commit_persists_and_clears_draft() {
        let conn = db::open_in_memory().expect("db");
        seed(&conn, "R001");
        seed(&conn, "R002");
        let store = DraftStore::new();
        store.save("t1", &input(&[("R001", "present"), ("R002", "absent")])).expect("save");

        let receipt = store.commit(&conn, "t1", &scope()).expect("commit");
        assert_eq!(receipt.record_ids.len(), 2);
        assert_eq!(attendance::count_records(&conn).expect("count"), 2);
        assert!(store.get("t1", &scope()).expect("get").is_none());
    }

    #[test]
    fn failed_commit_keeps_draft() {
        let conn = db::open_in_memory().expect("db");
        seed(&conn, "R001");
        let store = DraftStore::new();
        store.save("t1", &input(&[("R001", "present"), ("R404", "absent")])).expect("save");

        let e = store.commit(&conn, "t1", &scope()).expect_err("unknown roll");
        assert_eq!(e.code(), "PARTIAL_WRITE");
        assert_eq!(attendance::count_records(&conn).expect("count"), 0);
        assert!(store.get("t1", &scope()).expect("get").is_some());
    }

    #[test]
    fn commit_without_draft_is_not_found() {
        let conn = db::open_in_memory().expect("db");
        let store = DraftStore::new();
        let e = store.commit(&conn, "t1", &scope()).expect_err("none");
        assert_eq!(e.code(), "NOT_FOUND");
        assert!(!store.discard("t1", &scope()).expect("discard"));
    }
}
