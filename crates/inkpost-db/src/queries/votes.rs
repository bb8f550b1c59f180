use anyhow::Result;
use inkpost_types::models::VoteType;
use rusqlite::{Connection, TransactionBehavior, params};

use super::OptionalExt;
use crate::Database;
use crate::models::{VoteChange, VoteOutcome, VoteTarget};

/// Table and column names for one kind of vote target.
struct VoteTables {
    target: &'static str,
    upvotes: &'static str,
    downvotes: &'static str,
    votes: &'static str,
    target_fk: &'static str,
}

impl VoteTarget {
    fn tables(self) -> VoteTables {
        match self {
            VoteTarget::Blog => VoteTables {
                target: "blogs",
                upvotes: "upvote_count",
                downvotes: "downvote_count",
                votes: "blog_votes",
                target_fk: "blog_id",
            },
            VoteTarget::Comment => VoteTables {
                target: "comments",
                upvotes: "upvotes",
                downvotes: "downvotes",
                votes: "comment_votes",
                target_fk: "comment_id",
            },
        }
    }
}

impl VoteTables {
    fn counter(&self, vote_type: VoteType) -> &'static str {
        match vote_type {
            VoteType::Upvote => self.upvotes,
            VoteType::Downvote => self.downvotes,
        }
    }
}

impl Database {
    // -- Votes --

    /// Records `user_id`'s vote on the target and keeps its counters in step,
    /// all inside one write transaction. Returns `None` if the target does
    /// not exist.
    pub fn cast_vote(
        &self,
        target: VoteTarget,
        target_id: i64,
        user_id: i64,
        vote_type: VoteType,
    ) -> Result<Option<VoteOutcome>> {
        let t = target.tables();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let exists = tx
                .query_row(
                    &format!("SELECT 1 FROM {} WHERE id = ?1", t.target),
                    [target_id],
                    |_| Ok(()),
                )
                .optional()?;
            if exists.is_none() {
                return Ok(None);
            }

            let existing: Option<String> = tx
                .query_row(
                    &format!(
                        "SELECT vote_type FROM {} WHERE user_id = ?1 AND {} = ?2",
                        t.votes, t.target_fk
                    ),
                    [user_id, target_id],
                    |row| row.get(0),
                )
                .optional()?;
            let existing = existing
                .map(|value| value.parse::<VoteType>().map_err(anyhow::Error::msg))
                .transpose()?;

            let change = match existing {
                None => {
                    tx.execute(
                        &format!(
                            "INSERT INTO {} (user_id, {}, vote_type) VALUES (?1, ?2, ?3)",
                            t.votes, t.target_fk
                        ),
                        params![user_id, target_id, vote_type.as_str()],
                    )?;
                    adjust(&tx, &t, target_id, None, vote_type)?;
                    VoteChange::Created
                }
                Some(previous) if previous == vote_type => VoteChange::Unchanged,
                Some(previous) => {
                    tx.execute(
                        &format!(
                            "UPDATE {} SET vote_type = ?1 WHERE user_id = ?2 AND {} = ?3",
                            t.votes, t.target_fk
                        ),
                        params![vote_type.as_str(), user_id, target_id],
                    )?;
                    adjust(&tx, &t, target_id, Some(previous), vote_type)?;
                    VoteChange::Switched { from: previous }
                }
            };

            let (upvotes, downvotes) = tx.query_row(
                &format!(
                    "SELECT {}, {} FROM {} WHERE id = ?1",
                    t.upvotes, t.downvotes, t.target
                ),
                [target_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            tx.commit()?;

            Ok(Some(VoteOutcome {
                change,
                upvotes,
                downvotes,
            }))
        })
    }

    /// Recounts `(upvotes, downvotes)` from the individual vote rows.
    pub fn count_votes(&self, target: VoteTarget, target_id: i64) -> Result<(i64, i64)> {
        let t = target.tables();
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT COALESCE(SUM(vote_type = 'upvote'), 0), COALESCE(SUM(vote_type = 'downvote'), 0)
                 FROM {} WHERE {} = ?1",
                t.votes, t.target_fk
            );
            Ok(conn.query_row(&sql, [target_id], |row| Ok((row.get(0)?, row.get(1)?)))?)
        })
    }
}

/// Moves one vote from `from`'s counter (if any) to `to`'s. Counters never
/// drop below zero.
fn adjust(
    conn: &Connection,
    t: &VoteTables,
    target_id: i64,
    from: Option<VoteType>,
    to: VoteType,
) -> Result<()> {
    let mut sets = vec![format!("{0} = {0} + 1", t.counter(to))];
    if let Some(from) = from {
        sets.push(format!("{0} = MAX({0} - 1, 0)", t.counter(from)));
    }
    conn.execute(
        &format!("UPDATE {} SET {} WHERE id = ?1", t.target, sets.join(", ")),
        [target_id],
    )?;
    Ok(())
}
