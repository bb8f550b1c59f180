use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, TransactionBehavior, params_from_iter};

use super::{OptionalExt, placeholders};
use crate::models::{ProfileChanges, TakenFields, UserRow};
use crate::{Database, timestamp_now};

const USER_COLUMNS: &str =
    "id, username, email, password, bio, phone_number, profile_picture, is_superuser, date_joined";

impl Database {
    // -- Users --

    /// Inserts a user unless the username or email is already held. The
    /// check and the insert share one IMMEDIATE transaction.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<std::result::Result<i64, TakenFields>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let clash = taken_fields(&tx, Some(username), Some(email), None)?;
            if clash.any() {
                return Ok(Err(clash));
            }
            tx.execute(
                "INSERT INTO users (username, email, password, date_joined) VALUES (?1, ?2, ?3, ?4)",
                (username, email, password_hash, timestamp_now()),
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;
            Ok(Ok(id))
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", Value::Integer(id)))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", Value::Text(username.to_string())))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", Value::Text(email.to_string())))
    }

    /// Resolves usernames to `(id, username)` pairs. Unknown names are
    /// simply absent from the result.
    pub fn find_users_by_usernames(&self, usernames: &[String]) -> Result<Vec<(i64, String)>> {
        if usernames.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, username FROM users WHERE username IN ({})",
                placeholders(usernames.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(usernames.iter()), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Writes the given columns. A username or email held by another user
    /// aborts the whole update.
    pub fn update_profile(
        &self,
        id: i64,
        changes: &ProfileChanges,
    ) -> Result<std::result::Result<(), TakenFields>> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(username) = &changes.username {
            sets.push("username");
            values.push(Value::Text(username.clone()));
        }
        if let Some(email) = &changes.email {
            sets.push("email");
            values.push(Value::Text(email.clone()));
        }
        for (column, change) in [
            ("bio", &changes.bio),
            ("phone_number", &changes.phone_number),
            ("profile_picture", &changes.profile_picture),
        ] {
            if let Some(value) = change {
                sets.push(column);
                values.push(value.clone().map(Value::Text).unwrap_or(Value::Null));
            }
        }

        if sets.is_empty() {
            return Ok(Ok(()));
        }

        let assignments: Vec<String> = sets
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{} = ?{}", column, i + 1))
            .collect();
        let sql = format!(
            "UPDATE users SET {} WHERE id = ?{}",
            assignments.join(", "),
            sets.len() + 1
        );
        values.push(Value::Integer(id));

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let clash = taken_fields(
                &tx,
                changes.username.as_deref(),
                changes.email.as_deref(),
                Some(id),
            )?;
            if clash.any() {
                return Ok(Err(clash));
            }
            tx.execute(&sql, params_from_iter(values.iter()))?;
            tx.commit()?;
            Ok(Ok(()))
        })
    }

    /// Returns false if no such user exists.
    pub fn set_superuser(&self, username: &str, is_superuser: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET is_superuser = ?1 WHERE username = ?2",
                (is_superuser, username),
            )?;
            Ok(updated > 0)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: Value) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], map_user).optional()
}

fn taken_fields(
    conn: &Connection,
    username: Option<&str>,
    email: Option<&str>,
    except_id: Option<i64>,
) -> Result<TakenFields> {
    let mut fields = TakenFields::default();
    if let Some(username) = username {
        fields.username = taken(conn, "username", username, except_id)?;
    }
    if let Some(email) = email {
        fields.email = taken(conn, "email", email, except_id)?;
    }
    Ok(fields)
}

/// True when a user other than `except_id` holds `value` in `column`.
fn taken(conn: &Connection, column: &str, value: &str, except_id: Option<i64>) -> Result<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM users WHERE {} = ?1 AND id != ?2)",
        column
    );
    let exists: bool = conn.query_row(&sql, (value, except_id.unwrap_or(-1)), |row| row.get(0))?;
    Ok(exists)
}

fn map_user(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        bio: row.get(4)?,
        phone_number: row.get(5)?,
        profile_picture: row.get(6)?,
        is_superuser: row.get(7)?,
        date_joined: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::queries::fixtures;
    use std::sync::Arc;

    #[test]
    fn duplicate_username_or_email_is_reported() {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "alice");

        let clash = db.create_user("alice", "alice@example.com", "h").unwrap();
        assert_eq!(clash, Err(TakenFields { username: true, email: true }));
        let clash = db.create_user("other", "alice@example.com", "h").unwrap();
        assert_eq!(clash, Err(TakenFields { username: false, email: true }));
        assert!(db.create_user("other", "other@example.com", "h").unwrap().is_ok());
    }

    #[test]
    fn concurrent_signups_for_one_name_create_one_user() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || db.create_user("dup", "dup@example.com", "h").unwrap())
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .filter_map(|o| o.err())
                .all(|clash| clash == TakenFields { username: true, email: true })
        );
    }

    #[test]
    fn profile_update_refuses_names_held_by_others() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        fixtures::user(&db, "bob");

        // Keeping one's own name is not a clash
        let own = ProfileChanges {
            username: Some("alice".into()),
            bio: Some(Some("hi".into())),
            ..Default::default()
        };
        assert_eq!(db.update_profile(alice, &own).unwrap(), Ok(()));

        let stolen = ProfileChanges {
            username: Some("bob".into()),
            bio: Some(Some("changed".into())),
            ..Default::default()
        };
        assert_eq!(
            db.update_profile(alice, &stolen).unwrap(),
            Err(TakenFields { username: true, email: false })
        );
        let user = db.get_user_by_id(alice).unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.bio.as_deref(), Some("hi"));
    }

    #[test]
    fn profile_changes_only_touch_given_columns() {
        let db = Database::open_in_memory().unwrap();
        let id = fixtures::user(&db, "alice");

        db.update_profile(
            id,
            &ProfileChanges {
                bio: Some(Some("hello".into())),
                phone_number: Some(Some("555-0100".into())),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        db.update_profile(
            id,
            &ProfileChanges {
                phone_number: Some(None),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();

        let user = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.bio.as_deref(), Some("hello"));
        assert_eq!(user.phone_number, None);
    }

    #[test]
    fn find_users_skips_unknown_names() {
        let db = Database::open_in_memory().unwrap();
        let bob = fixtures::user(&db, "bob");
        let found = db
            .find_users_by_usernames(&["bob".to_string(), "ghost".to_string()])
            .unwrap();
        assert_eq!(found, vec![(bob, "bob".to_string())]);
    }

    #[test]
    fn set_superuser_reports_missing_user() {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "root");
        assert!(db.set_superuser("root", true).unwrap());
        assert!(!db.set_superuser("nobody", true).unwrap());
        assert!(db.get_user_by_username("root").unwrap().unwrap().is_superuser);
    }
}
