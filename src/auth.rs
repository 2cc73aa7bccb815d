//! Users, password verification and opaque session tokens.
//!
//! Tokens are random and handed to the client once; only their SHA-256 digest is
//! stored, bound to the user id and role with an expiry.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::model::{format_timestamp, parse_stored_timestamp, Role};
use crate::students;

const MIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes()).map_err(|e| {
        tracing::error!(error = %e, "salt encoding failed");
        AppError::Internal
    })?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            AppError::Internal
        })
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub student_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub student_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginGrant {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

/// The authenticated caller, passed explicitly to every gated operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: i64,
    pub role: Role,
    pub student_id: Option<i64>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn require_teacher(&self) -> AppResult<()> {
        match self.role {
            Role::Teacher => Ok(()),
            Role::Student => Err(AppError::Forbidden("teacher role required".to_string())),
        }
    }

    /// Teachers see everyone; a student sees only the linked student record.
    pub fn require_view_of(&self, student_id: i64) -> AppResult<()> {
        match self.role {
            Role::Teacher => Ok(()),
            Role::Student if self.student_id == Some(student_id) => Ok(()),
            Role::Student => Err(AppError::Forbidden(
                "students may only view their own attendance".to_string(),
            )),
        }
    }
}

fn user_by_email(conn: &Connection, email: &str) -> AppResult<Option<(UserInfo, String)>> {
    let row = conn
        .query_row(
            "SELECT id, email, full_name, role, student_id, password_hash FROM users WHERE email = ?",
            [email],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<i64>>(4)?,
                    r.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;
    let Some((id, email, full_name, role, student_id, hash)) = row else {
        return Ok(None);
    };
    Ok(Some((
        UserInfo {
            id,
            email,
            full_name,
            role: role.parse()?,
            student_id,
        },
        hash,
    )))
}

pub fn get_user(conn: &Connection, user_id: i64) -> AppResult<UserInfo> {
    let row = conn
        .query_row(
            "SELECT id, email, full_name, role, student_id FROM users WHERE id = ?",
            [user_id],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<i64>>(4)?,
                ))
            },
        )
        .optional()?;
    let Some((id, email, full_name, role, student_id)) = row else {
        return Err(AppError::NotFound("user not found".to_string()));
    };
    Ok(UserInfo {
        id,
        email,
        full_name,
        role: role.parse()?,
        student_id,
    })
}

/// Who is creating an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registrar {
    /// An authenticated teacher, or an open server with auth not required.
    Teacher,
    /// Anyone else. May create an unlinked student account, or the first
    /// teacher account of an empty installation.
    SelfService,
}

fn teacher_exists(conn: &Connection) -> AppResult<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM users WHERE role = 'teacher' LIMIT 1", [], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

fn student_linked(conn: &Connection, student_id: i64) -> AppResult<bool> {
    Ok(conn
        .query_row("SELECT 1 FROM users WHERE student_id = ?", [student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some())
}

pub fn register(
    conn: &Connection,
    input: &RegisterInput,
    registrar: Registrar,
) -> AppResult<UserInfo> {
    let full_name = input.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::Validation("missing full_name".to_string()));
    }
    let email = input.email.trim().to_ascii_lowercase();
    if !email.contains('@') {
        return Err(AppError::Validation("email must contain @".to_string()));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let role: Role = input.role.parse()?;
    if registrar == Registrar::SelfService {
        if input.student_id.is_some() {
            return Err(AppError::Forbidden(
                "only a teacher may link an account to a student".to_string(),
            ));
        }
        if role == Role::Teacher && teacher_exists(conn)? {
            return Err(AppError::Forbidden(
                "only a teacher may create teacher accounts".to_string(),
            ));
        }
    }
    if let Some(sid) = input.student_id {
        students::require_student(conn, sid)?;
        if student_linked(conn, sid)? {
            return Err(AppError::Conflict(format!(
                "student {} is already linked to an account",
                sid
            )));
        }
    }
    if user_by_email(conn, &email)?.is_some() {
        return Err(AppError::Conflict("email already registered".to_string()));
    }

    conn.execute(
        "INSERT INTO users(email, full_name, password_hash, role, student_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &email,
            full_name,
            hash_password(&input.password)?,
            role.as_str(),
            input.student_id,
            format_timestamp(&Utc::now()),
        ),
    )?;
    let id = conn.last_insert_rowid();
    info!(user_id = id, role = role.as_str(), "user registered");
    get_user(conn, id)
}

/// Verifies email, password and role together; any mismatch is the same error.
pub fn login(conn: &Connection, input: &LoginInput, ttl: Duration) -> AppResult<LoginGrant> {
    let email = input.email.trim().to_ascii_lowercase();
    let requested_role: Option<Role> = input.role.parse().ok();
    let rejected = || AppError::Unauthorized("incorrect email, password, or role".to_string());

    let Some((user, hash)) = user_by_email(conn, &email)? else {
        warn!("login for unknown email");
        return Err(rejected());
    };
    if !verify_password(&input.password, &hash) || requested_role != Some(user.role) {
        warn!(user_id = user.id, "login rejected");
        return Err(rejected());
    }

    let token = format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    );
    let expires_at = Utc::now() + ttl;
    conn.execute(
        "INSERT INTO sessions(token_hash, user_id, role, expires_at) VALUES(?, ?, ?, ?)",
        (
            token_digest(&token),
            user.id,
            user.role.as_str(),
            format_timestamp(&expires_at),
        ),
    )?;
    info!(user_id = user.id, "session issued");
    Ok(LoginGrant {
        access_token: token,
        token_type: "bearer",
        expires_at,
        user,
    })
}

pub fn authenticate(conn: &Connection, token: &str) -> AppResult<Session> {
    let digest = token_digest(token.trim());
    let row = conn
        .query_row(
            "SELECT s.user_id, s.role, s.expires_at, u.student_id
             FROM sessions s JOIN users u ON u.id = s.user_id
             WHERE s.token_hash = ?",
            [&digest],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<i64>>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((user_id, role, expires_at, student_id)) = row else {
        return Err(AppError::Unauthorized("invalid session".to_string()));
    };
    let expires_at = parse_stored_timestamp(&expires_at)?;
    if expires_at <= Utc::now() {
        conn.execute("DELETE FROM sessions WHERE token_hash = ?", [&digest])?;
        return Err(AppError::Unauthorized("session expired".to_string()));
    }
    Ok(Session {
        user_id,
        role: role.parse()?,
        student_id,
        expires_at,
    })
}

/// Returns whether a session was removed.
pub fn logout(conn: &Connection, token: &str) -> AppResult<bool> {
    let n = conn.execute(
        "DELETE FROM sessions WHERE token_hash = ?",
        [token_digest(token.trim())],
    )?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn teacher() -> RegisterInput {
        RegisterInput {
            full_name: "Meera Rao".into(),
            email: "Meera@School.test".into(),
            password: "correct horse".into(),
            role: "teacher".into(),
            student_id: None,
        }
    }

    fn login_input(password: &str, role: &str) -> LoginInput {
        LoginInput {
            email: "meera@school.test".into(),
            password: password.into(),
            role: role.into(),
        }
    }

    #[test]
    fn password_hash_verifies_and_is_salted() {
        let a = hash_password("s3cret-pass").expect("hash");
        let b = hash_password("s3cret-pass").expect("hash");
        assert_ne!(a, b);
        assert!(verify_password("s3cret-pass", &a));
        assert!(!verify_password("wrong", &a));
        assert!(!verify_password("s3cret-pass", "plaintext"));
    }

    #[test]
    fn register_normalizes_email_and_rejects_duplicates() {
        let conn = db::open_in_memory().expect("db");
        let u = register(&conn, &teacher(), Registrar::SelfService).expect("register");
        assert_eq!(u.email, "meera@school.test");
        assert_eq!(u.role, Role::Teacher);
        assert_eq!(register(&conn, &teacher(), Registrar::Teacher).expect_err("dup").code(), "CONFLICT");
    }

    #[test]
    fn register_validates_input() {
        let conn = db::open_in_memory().expect("db");
        let mut r = teacher();
        r.password = "short".into();
        assert_eq!(register(&conn, &r, Registrar::Teacher).expect_err("pw").code(), "VALIDATION");
        r = teacher();
        r.role = "admin".into();
        assert_eq!(register(&conn, &r, Registrar::Teacher).expect_err("role").code(), "VALIDATION");
        r = teacher();
        r.student_id = Some(5);
        assert_eq!(register(&conn, &r, Registrar::Teacher).expect_err("student").code(), "NOT_FOUND");
    }

    #[test]
    fn login_issues_token_that_authenticates() {
        let conn = db::open_in_memory().expect("db");
        let u = register(&conn, &teacher(), Registrar::SelfService).expect("register");
        let grant = login(&conn, &login_input("correct horse", "teacher"), Duration::hours(1))
            .expect("login");
        assert_eq!(grant.token_type, "bearer");
        let session = authenticate(&conn, &grant.access_token).expect("session");
        assert_eq!(session.user_id, u.id);
        assert_eq!(session.role, Role::Teacher);

        let stored: String = conn
            .query_row("SELECT token_hash FROM sessions", [], |r| r.get(0))
            .expect("row");
        assert_ne!(stored, grant.access_token);
    }

    #[test]
    fn wrong_password_or_role_is_unauthorized() {
        let conn = db::open_in_memory().expect("db");
        register(&conn, &teacher(), Registrar::SelfService).expect("register");
        let ttl = Duration::hours(1);
        let e = login(&conn, &login_input("nope nope", "teacher"), ttl).expect_err("pw");
        assert_eq!(e.code(), "UNAUTHORIZED");
        let e = login(&conn, &login_input("correct horse", "student"), ttl).expect_err("role");
        assert_eq!(e.code(), "UNAUTHORIZED");
    }

    #[test]
    fn expired_and_logged_out_sessions_are_rejected() {
        let conn = db::open_in_memory().expect("db");
        register(&conn, &teacher(), Registrar::SelfService).expect("register");
        let expired = login(&conn, &login_input("correct horse", "teacher"), Duration::seconds(-1))
            .expect("login");
        assert_eq!(
            authenticate(&conn, &expired.access_token).expect_err("expired").code(),
            "UNAUTHORIZED"
        );

        let live = login(&conn, &login_input("correct horse", "teacher"), Duration::hours(1))
            .expect("login");
        assert!(logout(&conn, &live.access_token).expect("logout"));
        assert!(authenticate(&conn, &live.access_token).is_err());
        assert!(!logout(&conn, &live.access_token).expect("second logout"));
    }

    #[test]
    fn role_gate() {
        let now = Utc::now();
        let t = Session { user_id: 1, role: Role::Teacher, student_id: None, expires_at: now };
        let s = Session { user_id: 2, role: Role::Student, student_id: Some(7), expires_at: now };
        assert!(t.require_teacher().is_ok());
        assert!(t.require_view_of(7).is_ok());
        assert_eq!(s.require_teacher().expect_err("student").code(), "FORBIDDEN");
        assert!(s.require_view_of(7).is_ok());
        assert_eq!(s.require_view_of(8).expect_err("other").code(), "FORBIDDEN");
    }

    #[test]
    fn self_service_cannot_link_students_or_add_teachers() {
        let conn = db::open_in_memory().expect("db");
        register(&conn, &teacher(), Registrar::SelfService).expect("first teacher bootstraps");

        let mut second = teacher();
        second.email = "other@school.test".into();
        let e = register(&conn, &second, Registrar::SelfService).expect_err("second teacher");
        assert_eq!(e.code(), "FORBIDDEN");
        register(&conn, &second, Registrar::Teacher).expect("teacher-created teacher");

        let sid = students::create_student(
            &conn,
            &crate::model::NewStudent {
                name: "Ravi".into(),
                roll_number: "R002".into(),
                email: None,
                department: "CS".into(),
            },
        )
        .expect("student");
        let linked = RegisterInput {
            full_name: "Ravi".into(),
            email: "ravi@school.test".into(),
            password: "ravi-pass-1".into(),
            role: "student".into(),
            student_id: Some(sid),
        };
        let e = register(&conn, &linked, Registrar::SelfService).expect_err("self link");
        assert_eq!(e.code(), "FORBIDDEN");
        register(&conn, &linked, Registrar::Teacher).expect("teacher links");

        let again = RegisterInput {
            email: "mallory@school.test".into(),
            ..linked
        };
        let e = register(&conn, &again, Registrar::Teacher).expect_err("second link");
        assert_eq!(e.code(), "CONFLICT");
    }
}
