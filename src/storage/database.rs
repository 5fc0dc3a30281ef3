// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded deposit store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `deposits`: deposit_id → serialized Deposit (JSON bytes)
//! - `deposit_tag_index`: `tag|deposit_id` → deposit_id
//! - `owner_index`: `user_id|!created_ms|deposit_id` → deposit_id (newest first)
//! - `fiat_order_index` / `fiat_session_index`: provider order / session ID → deposit_id
//! - `custodial_tx_index`: custodial transaction ID → deposit_id
//! - `user_tags`: destination tag → user_id
//! - `user_tag_owners`: user_id → destination tag
//!
//! Webhook-driven updates run as a single write transaction each: load the
//! document, apply the event, write it back. redb admits one writer at a
//! time, so concurrent deliveries for the same deposit are serialized and the
//! custodial candidate scan cannot race the conditional write.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, Table, TableDefinition, WriteTransaction};

use super::deposits::Deposit;
use crate::reconcile::{
    apply_custodial_event, apply_fiat_event, correlate, synthetic_record, CandidateMatch,
    CustodialEvent, DepositStatus, FiatEvent, Transition,
};

// =============================================================================
// Table Definitions
// =============================================================================

const DEPOSITS: TableDefinition<&str, &[u8]> = TableDefinition::new("deposits");

/// Key format: `tag|deposit_id`.
const DEPOSIT_TAG_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("deposit_tag_index");

/// Key format: `user_id|!created_ms_be|deposit_id` for newest-first scans.
const OWNER_INDEX: TableDefinition<&[u8], &str> = TableDefinition::new("owner_index");

const FIAT_ORDER_INDEX: TableDefinition<&str, &str> = TableDefinition::new("fiat_order_index");
const FIAT_SESSION_INDEX: TableDefinition<&str, &str> = TableDefinition::new("fiat_session_index");
const CUSTODIAL_TX_INDEX: TableDefinition<&str, &str> = TableDefinition::new("custodial_tx_index");

const USER_TAGS: TableDefinition<&str, &str> = TableDefinition::new("user_tags");
const USER_TAG_OWNERS: TableDefinition<&str, &str> = TableDefinition::new("user_tag_owners");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DepositDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

pub type DepositDbResult<T> = Result<T, DepositDbError>;

// =============================================================================
// Outcomes
// =============================================================================

/// What a fiat webhook did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiatOutcome {
    Applied {
        deposit_id: String,
        transition: Transition,
    },
    /// Neither the order ID nor the session ID is known.
    NoDeposit,
}

/// Why a custodial event ended up on an unmatched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmatchedReason {
    NoDestinationTag,
    NoCandidate,
}

/// What a custodial webhook did to the store. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustodialOutcome {
    Matched {
        deposit_id: String,
        transition: Transition,
    },
    Unmatched {
        record_id: String,
        reason: UnmatchedReason,
    },
    Ambiguous {
        record_id: String,
        candidates: Vec<String>,
    },
}

/// Result of trying to bind a destination tag to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagClaim {
    Claimed(String),
    /// The user already had a tag; it is returned unchanged.
    AlreadyOwned(String),
    /// The tag belongs to someone else.
    Collision,
}

// =============================================================================
// Index Key Helpers
// =============================================================================

fn make_prefix(part: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(part.len() + 1);
    prefix.extend_from_slice(part.as_bytes());
    prefix.push(b'|');
    prefix
}

/// Upper bound for a range scan over `prefix`.
fn make_prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = Vec::with_capacity(prefix.len() + 20);
    end.extend_from_slice(prefix);
    end.extend_from_slice(&[0xFF; 20]);
    end
}

fn make_tag_key(tag: &str, deposit_id: &str) -> Vec<u8> {
    let mut key = make_prefix(tag);
    key.extend_from_slice(deposit_id.as_bytes());
    key
}

fn make_owner_key(user_id: &str, created_at: DateTime<Utc>, deposit_id: &str) -> Vec<u8> {
    let mut key = make_prefix(user_id);
    // Inverted so newer deposits sort first
    key.extend_from_slice(&(!created_at.timestamp_millis() as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(deposit_id.as_bytes());
    key
}

fn lookup<T>(table: &T, key: &str) -> DepositDbResult<Option<String>>
where
    T: ReadableTable<&'static str, &'static str>,
{
    Ok(table.get(key)?.map(|value| value.value().to_string()))
}

fn decode<T>(table: &T, deposit_id: &str) -> DepositDbResult<Option<Deposit>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(deposit_id)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

// =============================================================================
// Write-side table set
// =============================================================================

/// Every deposit table opened once inside one write transaction.
struct DepositTables<'txn> {
    deposits: Table<'txn, &'static str, &'static [u8]>,
    tag_index: Table<'txn, &'static [u8], &'static str>,
    owner_index: Table<'txn, &'static [u8], &'static str>,
    order_index: Table<'txn, &'static str, &'static str>,
    session_index: Table<'txn, &'static str, &'static str>,
    custodial_tx_index: Table<'txn, &'static str, &'static str>,
    user_tags: Table<'txn, &'static str, &'static str>,
}

impl<'txn> DepositTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> DepositDbResult<Self> {
        Ok(Self {
            deposits: txn.open_table(DEPOSITS)?,
            tag_index: txn.open_table(DEPOSIT_TAG_INDEX)?,
            owner_index: txn.open_table(OWNER_INDEX)?,
            order_index: txn.open_table(FIAT_ORDER_INDEX)?,
            session_index: txn.open_table(FIAT_SESSION_INDEX)?,
            custodial_tx_index: txn.open_table(CUSTODIAL_TX_INDEX)?,
            user_tags: txn.open_table(USER_TAGS)?,
        })
    }

    fn load(&self, deposit_id: &str) -> DepositDbResult<Option<Deposit>> {
        decode(&self.deposits, deposit_id)
    }

    /// Write the document and every index entry it implies.
    fn save(&mut self, deposit: &Deposit) -> DepositDbResult<()> {
        let json = serde_json::to_vec(deposit)?;
        let id = deposit.deposit_id.as_str();
        self.deposits.insert(id, json.as_slice())?;

        if let Some(tag) = deposit.destination.tag.as_deref() {
            self.tag_index.insert(make_tag_key(tag, id).as_slice(), id)?;
        }
        if let Some(user_id) = deposit.user_id.as_deref() {
            let key = make_owner_key(user_id, deposit.created_at, id);
            self.owner_index.insert(key.as_slice(), id)?;
        }
        if let Some(order_id) = deposit.fiat_provider.order_id.as_deref() {
            self.order_index.insert(order_id, id)?;
        }
        if let Some(session_id) = deposit.fiat_provider.session_id.as_deref() {
            self.session_index.insert(session_id, id)?;
        }
        if let Some(tx_id) = deposit.custodial_provider.transaction_id.as_deref() {
            self.custodial_tx_index.insert(tx_id, id)?;
        }
        Ok(())
    }

    fn find_fiat_target(&self, event: &FiatEvent) -> DepositDbResult<Option<Deposit>> {
        let by_order = match event.order_id.as_deref() {
            Some(order_id) => lookup(&self.order_index, order_id)?,
            None => None,
        };
        let deposit_id = match by_order {
            Some(id) => Some(id),
            None => match event.session_id.as_deref() {
                Some(session_id) => lookup(&self.session_index, session_id)?,
                None => None,
            },
        };
        match deposit_id {
            Some(id) => self.load(&id),
            None => Ok(None),
        }
    }

    /// Document that already absorbed an earlier delivery of this transaction.
    fn find_custodial_target(&self, event: &CustodialEvent) -> DepositDbResult<Option<Deposit>> {
        let Some(tx_id) = event.transaction_id.as_deref() else {
            return Ok(None);
        };
        match lookup(&self.custodial_tx_index, tx_id)? {
            Some(id) => self.load(&id),
            None => Ok(None),
        }
    }

    fn deposits_for_tag(&self, tag: &str) -> DepositDbResult<Vec<Deposit>> {
        let prefix = make_prefix(tag);
        let prefix_end = make_prefix_end(&prefix);

        let mut ids = Vec::new();
        for entry in self.tag_index.range(prefix.as_slice()..prefix_end.as_slice())? {
            let entry = entry?;
            ids.push(entry.1.value().to_string());
        }

        let mut deposits = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(deposit) = self.load(&id)? {
                deposits.push(deposit);
            }
        }
        Ok(deposits)
    }

    fn record_unmatched(
        &mut self,
        event: &CustodialEvent,
        user_id: Option<String>,
        environment: &str,
        reason: UnmatchedReason,
    ) -> DepositDbResult<CustodialOutcome> {
        let record = synthetic_record(
            DepositStatus::UnmatchedCustodial,
            event,
            user_id,
            environment,
            Vec::new(),
        );
        self.save(&record)?;
        Ok(CustodialOutcome::Unmatched {
            record_id: record.deposit_id,
            reason,
        })
    }

    /// Tag owner, the deposits carrying `tag`, and how the event matches them.
    fn correlation(
        &self,
        tag: &str,
        event: &CustodialEvent,
    ) -> DepositDbResult<(Option<String>, Vec<Deposit>, CandidateMatch)> {
        let owner = lookup(&self.user_tags, tag)?;
        let candidates = self.deposits_for_tag(tag)?;
        let matched = correlate(&candidates, tag, event.amount);
        Ok((owner, candidates, matched))
    }

    fn settle_candidate(
        &mut self,
        candidates: Vec<Deposit>,
        deposit_id: String,
        event: &CustodialEvent,
        environment: &str,
    ) -> DepositDbResult<CustodialOutcome> {
        let mut deposit = candidates
            .into_iter()
            .find(|deposit| deposit.deposit_id == deposit_id)
            .ok_or_else(|| DepositDbError::NotFound(format!("Deposit {deposit_id}")))?;
        let transition = apply_custodial_event(&mut deposit, event, environment);
        self.save(&deposit)?;
        Ok(CustodialOutcome::Matched {
            deposit_id,
            transition,
        })
    }

    /// First delivery of a custodial transaction: correlate by tag + amount.
    fn correlate_new(
        &mut self,
        event: &CustodialEvent,
        environment: &str,
    ) -> DepositDbResult<CustodialOutcome> {
        let Some(tag) = event.destination_tag.as_deref() else {
            return self.record_unmatched(event, None, environment, UnmatchedReason::NoDestinationTag);
        };
        let (owner, candidates, matched) = self.correlation(tag, event)?;

        match matched {
            CandidateMatch::None => {
                self.record_unmatched(event, owner, environment, UnmatchedReason::NoCandidate)
            }
            CandidateMatch::Single(deposit_id) => {
                self.settle_candidate(candidates, deposit_id, event, environment)
            }
            CandidateMatch::Ambiguous(ids) => {
                let record = synthetic_record(
                    DepositStatus::AmbiguousCustodial,
                    event,
                    owner,
                    environment,
                    ids.clone(),
                );
                self.save(&record)?;
                Ok(CustodialOutcome::Ambiguous {
                    record_id: record.deposit_id,
                    candidates: ids,
                })
            }
        }
    }

    /// Later delivery of a transaction parked on a review record.
    ///
    /// Earlier events may have lacked the tag or amount, so the event is
    /// correlated again. A single match moves the transaction onto that
    /// deposit; anything else is appended to the same review record.
    fn revisit_review_record(
        &mut self,
        mut record: Deposit,
        event: &CustodialEvent,
        environment: &str,
    ) -> DepositDbResult<CustodialOutcome> {
        if let Some(tag) = event.destination_tag.as_deref() {
            let (owner, candidates, matched) = self.correlation(tag, event)?;
            if let CandidateMatch::Single(deposit_id) = matched {
                tracing::info!(
                    deposit_id = %deposit_id,
                    record_id = %record.deposit_id,
                    transaction_id = ?event.transaction_id,
                    "Custodial transaction correlated after review record"
                );
                return self.settle_candidate(candidates, deposit_id, event, environment);
            }
            if record.destination.tag.is_none() {
                record.destination.tag = Some(tag.to_string());
            }
            if record.user_id.is_none() {
                record.user_id = owner;
            }
        }

        let transition = apply_custodial_event(&mut record, event, environment);
        self.save(&record)?;
        Ok(redelivery_outcome(&record, event, transition))
    }
}

/// Outcome reported for a redelivered event, based on the document it hit.
fn redelivery_outcome(
    document: &Deposit,
    event: &CustodialEvent,
    transition: Transition,
) -> CustodialOutcome {
    match document.status {
        DepositStatus::UnmatchedCustodial => CustodialOutcome::Unmatched {
            record_id: document.deposit_id.clone(),
            reason: if event.destination_tag.is_some() {
                UnmatchedReason::NoCandidate
            } else {
                UnmatchedReason::NoDestinationTag
            },
        },
        DepositStatus::AmbiguousCustodial => CustodialOutcome::Ambiguous {
            record_id: document.deposit_id.clone(),
            candidates: document.custodial_provider.candidate_deposit_ids.clone(),
        },
        _ => CustodialOutcome::Matched {
            deposit_id: document.deposit_id.clone(),
            transition,
        },
    }
}

// =============================================================================
// DepositDatabase
// =============================================================================

/// Embedded ACID deposit store.
pub struct DepositDatabase {
    db: Database,
}

impl DepositDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DepositDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            DepositTables::open(&write_txn)?;
            write_txn.open_table(USER_TAG_OWNERS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Cheap readiness probe.
    pub fn ping(&self) -> DepositDbResult<()> {
        let read_txn = self.db.begin_read()?;
        read_txn.open_table(DEPOSITS)?;
        Ok(())
    }

    // =========================================================================
    // Deposit CRUD
    // =========================================================================

    /// Persist a new deposit with all of its index entries.
    pub fn insert_deposit(&self, deposit: &Deposit) -> DepositDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut tables = DepositTables::open(&write_txn)?;
            if tables.deposits.get(deposit.deposit_id.as_str())?.is_some() {
                return Err(DepositDbError::AlreadyExists(format!(
                    "Deposit {}",
                    deposit.deposit_id
                )));
            }
            tables.save(deposit)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_deposit(&self, deposit_id: &str) -> DepositDbResult<Option<Deposit>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEPOSITS)?;
        decode(&table, deposit_id)
    }

    /// All deposits owned by `user_id`, newest first.
    pub fn list_by_owner(&self, user_id: &str) -> DepositDbResult<Vec<Deposit>> {
        let read_txn = self.db.begin_read()?;
        let idx_table = read_txn.open_table(OWNER_INDEX)?;
        let deposits = read_txn.open_table(DEPOSITS)?;

        let prefix = make_prefix(user_id);
        let prefix_end = make_prefix_end(&prefix);

        let mut results = Vec::new();
        for entry in idx_table.range(prefix.as_slice()..prefix_end.as_slice())? {
            let entry = entry?;
            // `user_id|` also prefixes owners like `user_id|suffix`
            match decode(&deposits, entry.1.value())? {
                Some(deposit) if deposit.is_owned_by(user_id) => results.push(deposit),
                _ => {}
            }
        }
        Ok(results)
    }

    /// Number of stored documents, synthetic records included.
    #[cfg(test)]
    pub fn count_deposits(&self) -> DepositDbResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEPOSITS)?;
        Ok(table.iter()?.count())
    }

    // =========================================================================
    // Webhook reconciliation
    // =========================================================================

    /// Apply a fiat event to the deposit it names, if any.
    pub fn apply_fiat_event(
        &self,
        event: &FiatEvent,
        environment: &str,
    ) -> DepositDbResult<FiatOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut tables = DepositTables::open(&write_txn)?;
            let Some(mut deposit) = tables.find_fiat_target(event)? else {
                return Ok(FiatOutcome::NoDeposit);
            };
            let transition = apply_fiat_event(&mut deposit, event, environment);
            tables.save(&deposit)?;
            FiatOutcome::Applied {
                deposit_id: deposit.deposit_id,
                transition,
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    /// Correlate a custodial event and record the result.
    ///
    /// A transaction ID already settled onto a deposit goes back to that
    /// deposit. One parked on a review record is correlated again. Otherwise
    /// the tag + amount heuristic decides between a match and a new
    /// synthetic record.
    pub fn reconcile_custodial_event(
        &self,
        event: &CustodialEvent,
        environment: &str,
    ) -> DepositDbResult<CustodialOutcome> {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut tables = DepositTables::open(&write_txn)?;
            match tables.find_custodial_target(event)? {
                Some(record) if record.status.is_review() => {
                    tables.revisit_review_record(record, event, environment)?
                }
                Some(mut document) => {
                    let transition = apply_custodial_event(&mut document, event, environment);
                    tables.save(&document)?;
                    tracing::info!(
                        deposit_id = %document.deposit_id,
                        transaction_id = ?event.transaction_id,
                        "Custodial event redelivered to existing document"
                    );
                    redelivery_outcome(&document, event, transition)
                }
                None => tables.correlate_new(event, environment)?,
            }
        };
        write_txn.commit()?;
        Ok(outcome)
    }

    // =========================================================================
    // Destination tags
    // =========================================================================

    pub fn user_tag(&self, user_id: &str) -> DepositDbResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USER_TAG_OWNERS)?;
        lookup(&table, user_id)
    }

    #[cfg(test)]
    pub fn tag_owner(&self, tag: &str) -> DepositDbResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USER_TAGS)?;
        lookup(&table, tag)
    }

    /// Bind `tag` to `user_id` unless either side is already taken.
    pub fn claim_user_tag(&self, user_id: &str, tag: &str) -> DepositDbResult<TagClaim> {
        let write_txn = self.db.begin_write()?;
        let claim = {
            let mut owners = write_txn.open_table(USER_TAG_OWNERS)?;
            let mut tags = write_txn.open_table(USER_TAGS)?;

            if let Some(existing) = lookup(&owners, user_id)? {
                TagClaim::AlreadyOwned(existing)
            } else if lookup(&tags, tag)?.is_some() {
                TagClaim::Collision
            } else {
                tags.insert(tag, user_id)?;
                owners.insert(user_id, tag)?;
                TagClaim::Claimed(tag.to_string())
            }
        };
        write_txn.commit()?;
        Ok(claim)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Destination, FiatProviderState, Money};
    use std::sync::Arc;

    fn temp_db() -> (DepositDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = DepositDatabase::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    fn sample_deposit(user: &str, tag: &str, order: &str, expected: Option<f64>) -> Deposit {
        Deposit::initiated(
            user.to_string(),
            "XRP".to_string(),
            "STAGING".to_string(),
            Money {
                currency: "USD".to_string(),
                amount: 100.0,
            },
            expected.map(|amount| Money {
                currency: "XRP".to_string(),
                amount,
            }),
            Destination {
                address: Some("rAddress".to_string()),
                tag: Some(tag.to_string()),
            },
            FiatProviderState {
                order_id: Some(order.to_string()),
                session_id: Some(format!("sess-{order}")),
                ..Default::default()
            },
        )
    }

    fn fiat(raw: &str) -> FiatEvent {
        FiatEvent::parse(raw.as_bytes(), "XRP").unwrap()
    }

    fn custodial(raw: &str) -> CustodialEvent {
        CustodialEvent::parse(raw.as_bytes(), "XRP").unwrap()
    }

    #[test]
    fn insert_and_get_deposit() {
        let (db, _dir) = temp_db();
        let deposit = sample_deposit("user-1", "555", "o1", None);
        db.insert_deposit(&deposit).unwrap();

        let stored = db.get_deposit(&deposit.deposit_id).unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Initiated);
        assert_eq!(stored.destination.tag.as_deref(), Some("555"));
        assert!(matches!(
            db.insert_deposit(&deposit),
            Err(DepositDbError::AlreadyExists(_))
        ));
        assert!(db.get_deposit("missing").unwrap().is_none());
    }

    #[test]
    fn list_by_owner_is_newest_first_and_scoped() {
        let (db, _dir) = temp_db();
        let mut older = sample_deposit("user-1", "555", "o1", None);
        older.created_at = Utc::now() - chrono::Duration::seconds(60);
        let newer = sample_deposit("user-1", "555", "o2", None);
        let foreign = sample_deposit("user-10", "777", "o3", None);
        for deposit in [&older, &newer, &foreign] {
            db.insert_deposit(deposit).unwrap();
        }

        let listed = db.list_by_owner("user-1").unwrap();
        let ids: Vec<&str> = listed.iter().map(|d| d.deposit_id.as_str()).collect();
        assert_eq!(ids, [newer.deposit_id.as_str(), older.deposit_id.as_str()]);
    }

    #[test]
    fn owner_ids_containing_separator_stay_scoped() {
        let (db, _dir) = temp_db();
        let own = sample_deposit("acme", "555", "o1", None);
        let other = sample_deposit("acme|bob", "777", "o2", None);
        db.insert_deposit(&own).unwrap();
        db.insert_deposit(&other).unwrap();

        let listed = db.list_by_owner("acme").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].deposit_id, own.deposit_id);

        let listed = db.list_by_owner("acme|bob").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].deposit_id, other.deposit_id);
    }

    #[test]
    fn fiat_event_located_by_order_then_session() {
        let (db, _dir) = temp_db();
        let deposit = sample_deposit("user-1", "555", "o1", None);
        db.insert_deposit(&deposit).unwrap();

        let outcome = db
            .apply_fiat_event(&fiat(r#"{"orderId":"o1","status":"AWAITING_PAYMENT"}"#), "STAGING")
            .unwrap();
        assert!(matches!(outcome, FiatOutcome::Applied { .. }));

        let outcome = db
            .apply_fiat_event(
                &fiat(r#"{"orderId":"unknown","sessionId":"sess-o1","status":"COMPLETED"}"#),
                "STAGING",
            )
            .unwrap();
        assert_eq!(
            outcome,
            FiatOutcome::Applied {
                deposit_id: deposit.deposit_id.clone(),
                transition: Transition::Advanced {
                    from: DepositStatus::Pending,
                    to: DepositStatus::AwaitingSettlement
                }
            }
        );

        let stored = db.get_deposit(&deposit.deposit_id).unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::AwaitingSettlement);
        assert_eq!(stored.timeline().len(), 2);
    }

    #[test]
    fn unknown_fiat_order_is_not_synthesized() {
        let (db, _dir) = temp_db();
        let outcome = db
            .apply_fiat_event(&fiat(r#"{"orderId":"nope","status":"COMPLETED"}"#), "STAGING")
            .unwrap();
        assert_eq!(outcome, FiatOutcome::NoDeposit);
        assert_eq!(db.count_deposits().unwrap(), 0);
    }

    #[test]
    fn terminal_deposit_ignores_late_events() {
        let (db, _dir) = temp_db();
        let deposit = sample_deposit("user-1", "555", "o1", None);
        db.insert_deposit(&deposit).unwrap();

        db.apply_fiat_event(&fiat(r#"{"orderId":"o1","status":"REFUNDED"}"#), "STAGING")
            .unwrap();
        for status in ["AWAITING_PAYMENT", "COMPLETED", "FAILED"] {
            let raw = format!(r#"{{"orderId":"o1","status":"{status}"}}"#);
            db.apply_fiat_event(&fiat(&raw), "STAGING").unwrap();
        }

        let stored = db.get_deposit(&deposit.deposit_id).unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Refunded);
        assert_eq!(stored.timeline().len(), 4);
    }

    #[test]
    fn custodial_event_matches_single_candidate() {
        let (db, _dir) = temp_db();
        let deposit = sample_deposit("user-1", "555", "o1", Some(10.0001));
        db.insert_deposit(&deposit).unwrap();

        let outcome = db
            .reconcile_custodial_event(
                &custodial(
                    r#"{"id":"tx-1","destination":{"tag":"555"},"amount":"10.0","status":"COMPLETED"}"#,
                ),
                "SANDBOX",
            )
            .unwrap();

        assert!(matches!(outcome, CustodialOutcome::Matched { ref deposit_id, .. } if *deposit_id == deposit.deposit_id));
        assert_eq!(db.count_deposits().unwrap(), 1);
        let stored = db.get_deposit(&deposit.deposit_id).unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Settled);
    }

    #[test]
    fn custodial_event_without_tag_is_unmatched() {
        let (db, _dir) = temp_db();
        let outcome = db
            .reconcile_custodial_event(&custodial(r#"{"id":"tx-1","status":"COMPLETED"}"#), "SANDBOX")
            .unwrap();

        let CustodialOutcome::Unmatched { record_id, reason } = outcome else {
            panic!("expected unmatched outcome");
        };
        assert_eq!(reason, UnmatchedReason::NoDestinationTag);
        let record = db.get_deposit(&record_id).unwrap().unwrap();
        assert_eq!(record.status, DepositStatus::UnmatchedCustodial);
        assert_eq!(record.user_id, None);
    }

    #[test]
    fn unmatched_record_carries_tag_owner() {
        let (db, _dir) = temp_db();
        db.claim_user_tag("user-1", "555").unwrap();

        let outcome = db
            .reconcile_custodial_event(
                &custodial(r#"{"id":"tx-1","destination":{"tag":"555"},"status":"COMPLETED"}"#),
                "SANDBOX",
            )
            .unwrap();

        let CustodialOutcome::Unmatched { record_id, reason } = outcome else {
            panic!("expected unmatched outcome");
        };
        assert_eq!(reason, UnmatchedReason::NoCandidate);
        let record = db.get_deposit(&record_id).unwrap().unwrap();
        assert_eq!(record.user_id.as_deref(), Some("user-1"));
        assert_eq!(record.destination.tag.as_deref(), Some("555"));
        assert_eq!(db.count_deposits().unwrap(), 1);
    }

    #[test]
    fn several_candidates_produce_one_ambiguous_record() {
        let (db, _dir) = temp_db();
        let first = sample_deposit("user-1", "555", "o1", None);
        let second = sample_deposit("user-1", "555", "o2", Some(10.0));
        db.insert_deposit(&first).unwrap();
        db.insert_deposit(&second).unwrap();

        let outcome = db
            .reconcile_custodial_event(
                &custodial(r#"{"id":"tx-1","destination":{"tag":"555"},"amount":10,"status":"COMPLETED"}"#),
                "SANDBOX",
            )
            .unwrap();

        let CustodialOutcome::Ambiguous { record_id, candidates } = outcome else {
            panic!("expected ambiguous outcome");
        };
        assert_eq!(candidates.len(), 2);
        assert!(candidates.contains(&first.deposit_id));
        assert!(candidates.contains(&second.deposit_id));
        assert_eq!(db.count_deposits().unwrap(), 3);

        let record = db.get_deposit(&record_id).unwrap().unwrap();
        assert_eq!(record.status, DepositStatus::AmbiguousCustodial);
        assert_eq!(record.custodial_provider.candidate_deposit_ids.len(), 2);
        for id in [&first.deposit_id, &second.deposit_id] {
            let untouched = db.get_deposit(id).unwrap().unwrap();
            assert_eq!(untouched.status, DepositStatus::Initiated);
            assert!(untouched.timeline().is_empty());
        }
    }

    #[test]
    fn redelivered_custodial_event_reuses_document() {
        let (db, _dir) = temp_db();
        let event = custodial(r#"{"id":"tx-1","destination":{"tag":"999"},"status":"COMPLETED"}"#);

        let first = db.reconcile_custodial_event(&event, "SANDBOX").unwrap();
        let second = db.reconcile_custodial_event(&event, "SANDBOX").unwrap();

        let (CustodialOutcome::Unmatched { record_id: a, .. }, CustodialOutcome::Unmatched { record_id: b, .. }) =
            (first, second)
        else {
            panic!("expected unmatched outcomes");
        };
        assert_eq!(a, b);
        assert_eq!(db.count_deposits().unwrap(), 1);
        assert_eq!(db.get_deposit(&a).unwrap().unwrap().timeline().len(), 2);
    }

    #[test]
    fn transaction_parked_without_tag_is_correlated_later() {
        let (db, _dir) = temp_db();
        let deposit = sample_deposit("user-1", "555", "o1", Some(10.0));
        db.insert_deposit(&deposit).unwrap();

        let first = db
            .reconcile_custodial_event(&custodial(r#"{"id":"tx-1","status":"SUBMITTED"}"#), "SANDBOX")
            .unwrap();
        let CustodialOutcome::Unmatched { record_id, .. } = first else {
            panic!("expected unmatched outcome");
        };

        let completed = custodial(
            r#"{"id":"tx-1","status":"COMPLETED","amount":"10.0","destination":{"tag":"555"}}"#,
        );
        let second = db.reconcile_custodial_event(&completed, "SANDBOX").unwrap();
        assert!(matches!(second, CustodialOutcome::Matched { ref deposit_id, .. } if *deposit_id == deposit.deposit_id));

        let stored = db.get_deposit(&deposit.deposit_id).unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Settled);
        assert_eq!(stored.custodial_provider.transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(db.count_deposits().unwrap(), 2);

        let parked = db.get_deposit(&record_id).unwrap().unwrap();
        assert_eq!(parked.status, DepositStatus::UnmatchedCustodial);
        assert_eq!(parked.timeline().len(), 1);

        // Further deliveries follow the deposit now holding the transaction
        let third = db.reconcile_custodial_event(&completed, "SANDBOX").unwrap();
        assert!(matches!(third, CustodialOutcome::Matched { ref deposit_id, .. } if *deposit_id == deposit.deposit_id));
        assert_eq!(db.count_deposits().unwrap(), 2);
        assert_eq!(db.get_deposit(&deposit.deposit_id).unwrap().unwrap().timeline().len(), 2);
    }

    #[test]
    fn uncorrelated_redelivery_appends_to_review_record() {
        let (db, _dir) = temp_db();
        db.claim_user_tag("user-9", "999").unwrap();

        let first = db
            .reconcile_custodial_event(&custodial(r#"{"id":"tx-1","status":"SUBMITTED"}"#), "SANDBOX")
            .unwrap();
        let second = db
            .reconcile_custodial_event(
                &custodial(r#"{"id":"tx-1","destination":{"tag":"999"},"status":"COMPLETED"}"#),
                "SANDBOX",
            )
            .unwrap();

        let (
            CustodialOutcome::Unmatched { record_id: a, .. },
            CustodialOutcome::Unmatched { record_id: b, reason },
        ) = (first, second)
        else {
            panic!("expected unmatched outcomes");
        };
        assert_eq!(a, b);
        assert_eq!(reason, UnmatchedReason::NoCandidate);
        assert_eq!(db.count_deposits().unwrap(), 1);

        let record = db.get_deposit(&a).unwrap().unwrap();
        assert_eq!(record.status, DepositStatus::UnmatchedCustodial);
        assert_eq!(record.destination.tag.as_deref(), Some("999"));
        assert_eq!(record.user_id.as_deref(), Some("user-9"));
        assert_eq!(record.timeline().len(), 2);
    }

    #[test]
    fn custodial_progress_follows_transaction_id() {
        let (db, _dir) = temp_db();
        let deposit = sample_deposit("user-1", "555", "o1", Some(10.0));
        db.insert_deposit(&deposit).unwrap();

        db.reconcile_custodial_event(
            &custodial(r#"{"id":"tx-1","destination":{"tag":"555"},"amount":10,"status":"CONFIRMING"}"#),
            "SANDBOX",
        )
        .unwrap();
        let outcome = db
            .reconcile_custodial_event(
                &custodial(r#"{"id":"tx-1","destination":{"tag":"555"},"amount":10,"status":"COMPLETED"}"#),
                "SANDBOX",
            )
            .unwrap();

        assert!(matches!(outcome, CustodialOutcome::Matched { transition, .. } if transition.is_applied()));
        let stored = db.get_deposit(&deposit.deposit_id).unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Settled);
        assert_eq!(stored.timeline().len(), 2);
    }

    #[test]
    fn concurrent_transfers_cannot_both_claim_one_deposit() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        let deposit = sample_deposit("user-1", "555", "o1", None);
        db.insert_deposit(&deposit).unwrap();

        let outcomes: Vec<CustodialOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let db = Arc::clone(&db);
                    scope.spawn(move || {
                        let raw = format!(
                            r#"{{"id":"tx-{i}","destination":{{"tag":"555"}},"status":"COMPLETED"}}"#
                        );
                        db.reconcile_custodial_event(&custodial(&raw), "SANDBOX").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let matched = outcomes
            .iter()
            .filter(|o| matches!(o, CustodialOutcome::Matched { .. }))
            .count();
        assert_eq!(matched, 1);
        let stored = db.get_deposit(&deposit.deposit_id).unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::Settled);
        assert_eq!(stored.timeline().len(), 1);
    }

    #[test]
    fn concurrent_fiat_deliveries_keep_every_event() {
        let (db, _dir) = temp_db();
        let db = Arc::new(db);
        let deposit = sample_deposit("user-1", "555", "o1", None);
        db.insert_deposit(&deposit).unwrap();

        let statuses = ["AWAITING_PAYMENT", "COMPLETED", "PENDING_DELIVERY", "AWAITING_DELIVERY"];
        std::thread::scope(|scope| {
            for status in statuses {
                let db = Arc::clone(&db);
                scope.spawn(move || {
                    let raw = format!(r#"{{"orderId":"o1","status":"{status}"}}"#);
                    db.apply_fiat_event(&fiat(&raw), "STAGING").unwrap();
                });
            }
        });

        let stored = db.get_deposit(&deposit.deposit_id).unwrap().unwrap();
        assert_eq!(stored.status, DepositStatus::AwaitingSettlement);
        assert_eq!(stored.timeline().len(), statuses.len());
    }

    #[test]
    fn tag_claims() {
        let (db, _dir) = temp_db();
        assert_eq!(
            db.claim_user_tag("user-1", "12345678").unwrap(),
            TagClaim::Claimed("12345678".to_string())
        );
        assert_eq!(db.claim_user_tag("user-2", "12345678").unwrap(), TagClaim::Collision);
        assert_eq!(
            db.claim_user_tag("user-1", "87654321").unwrap(),
            TagClaim::AlreadyOwned("12345678".to_string())
        );
        assert_eq!(db.user_tag("user-1").unwrap().as_deref(), Some("12345678"));
        assert_eq!(db.tag_owner("12345678").unwrap().as_deref(), Some("user-1"));
        assert_eq!(db.user_tag("user-2").unwrap(), None);
    }

    #[test]
    fn owner_key_ordering() {
        let now = Utc::now();
        let older = make_owner_key("user", now - chrono::Duration::seconds(1), "a");
        let newer = make_owner_key("user", now, "b");
        assert!(newer < older, "newer deposits should sort first");
    }

    #[test]
    fn ping_succeeds_on_open_database() {
        let (db, _dir) = temp_db();
        db.ping().unwrap();
    }
}
