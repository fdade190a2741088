use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{KvStore, ScanPage, StoreError};

/// Store operations, used to inject failures in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Ping,
    Get,
    Del,
    Exists,
    Ttl,
    Scan,
    ListRange,
    ListRemove,
    SetMembers,
    SetRemove,
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

type Entries = BTreeMap<String, Entry>;

/// In-process [`KvStore`] with Redis semantics for the commands the
/// registry uses: strings, lists, sets, TTLs and cursor scans.
///
/// Scan cursors are positions in the sorted key space. Expired keys are
/// invisible to every operation and are dropped from the map on each scan.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
    failing: Mutex<HashSet<Op>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, op: Op) -> Result<(), StoreError> {
        let failing = self.failing.lock().unwrap_or_else(PoisonError::into_inner);
        if failing.contains(&op) {
            return Err(StoreError::Backend(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    /// Makes every subsequent `op` fail with a backend error.
    pub fn fail(&self, op: Op) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op);
    }

    /// Clears a failure injected with [`MemoryStore::fail`].
    pub fn heal(&self, op: Op) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&op);
    }

    /// `SET key value`, without expiry.
    pub fn set(&self, key: &str, value: &str) {
        self.put(key, Value::Str(value.to_string()), None);
    }

    /// `SET key value EX ttl`.
    pub fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        self.put(key, Value::Str(value.to_string()), Some(Instant::now() + ttl));
    }

    /// `RPUSH key value`. Replaces a non-list value.
    pub fn list_push(&self, key: &str, value: &str) {
        let mut entries = self.lock();
        let now = Instant::now();
        purge_if_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(Entry { value: Value::List(items), .. }) => items.push(value.to_string()),
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry { value: Value::List(vec![value.to_string()]), expires_at: None },
                );
            }
        }
    }

    /// `SADD key member`. Replaces a non-set value.
    pub fn set_add(&self, key: &str, member: &str) {
        let mut entries = self.lock();
        let now = Instant::now();
        purge_if_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(Entry { value: Value::Set(members), .. }) => {
                members.insert(member.to_string());
            }
            _ => {
                let members = BTreeSet::from([member.to_string()]);
                entries.insert(key.to_string(), Entry { value: Value::Set(members), expires_at: None });
            }
        }
    }

    fn put(&self, key: &str, value: Value, expires_at: Option<Instant>) {
        self.lock().insert(key.to_string(), Entry { value, expires_at });
    }
}

fn purge_if_expired(entries: &mut Entries, key: &str, now: Instant) {
    if entries.get(key).is_some_and(|e| !e.is_live(now)) {
        entries.remove(key);
    }
}

fn live<'a>(entries: &'a Entries, key: &str, now: Instant) -> Option<&'a Entry> {
    entries.get(key).filter(|e| e.is_live(now))
}

/// Resolves Redis-style inclusive bounds against a list of `len` items.
fn range_bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start >= len || start > stop {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

/// Redis `MATCH` globbing with `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check(Op::Ping)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check(Op::Get)?;
        let entries = self.lock();
        match live(&entries, key, Instant::now()).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    async fn del(&self, key: &str) -> Result<u64, StoreError> {
        self.check(Op::Del)?;
        let mut entries = self.lock();
        purge_if_expired(&mut entries, key, Instant::now());
        Ok(u64::from(entries.remove(key).is_some()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check(Op::Exists)?;
        Ok(live(&self.lock(), key, Instant::now()).is_some())
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        self.check(Op::Ttl)?;
        let now = Instant::now();
        let entries = self.lock();
        Ok(match live(&entries, key, now) {
            None => -2,
            Some(Entry { expires_at: None, .. }) => -1,
            Some(Entry { expires_at: Some(at), .. }) => {
                let remaining = at.saturating_duration_since(now).as_secs_f64().ceil();
                remaining as i64
            }
        })
    }

    async fn scan(&self, cursor: &str, pattern: &str, count: usize) -> Result<ScanPage, StoreError> {
        self.check(Op::Scan)?;
        let position: usize = cursor
            .parse()
            .map_err(|_| StoreError::Backend("ERR invalid cursor".to_string()))?;

        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, e| e.is_live(now));
        let live_keys: Vec<&String> = entries.keys().collect();

        let end = position.saturating_add(count.max(1)).min(live_keys.len());
        let keys = live_keys
            .get(position..end)
            .unwrap_or_default()
            .iter()
            .filter(|k| glob_match(pattern, k))
            .map(|k| k.to_string())
            .collect();

        let cursor = if end >= live_keys.len() { "0".to_string() } else { end.to_string() };
        Ok(ScanPage { cursor, keys })
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, StoreError> {
        self.check(Op::ListRange)?;
        let entries = self.lock();
        match live(&entries, key, Instant::now()).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => Ok(range_bounds(items.len(), start, stop)
                .map(|(from, to)| items[from..=to].to_vec())
                .unwrap_or_default()),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    async fn list_remove(&self, key: &str, count: i64, value: &str) -> Result<u64, StoreError> {
        self.check(Op::ListRemove)?;
        let mut entries = self.lock();
        purge_if_expired(&mut entries, key, Instant::now());

        let items = match entries.get_mut(key).map(|e| &mut e.value) {
            None => return Ok(0),
            Some(Value::List(items)) => items,
            Some(_) => return Err(StoreError::WrongType),
        };

        let budget = if count == 0 { usize::MAX } else { usize::try_from(count.unsigned_abs()).unwrap_or(usize::MAX) };
        let mut removed = 0usize;
        if count < 0 {
            items.reverse();
        }
        items.retain(|item| {
            if removed < budget && item == value {
                removed += 1;
                false
            } else {
                true
            }
        });
        if count < 0 {
            items.reverse();
        }

        if items.is_empty() {
            entries.remove(key);
        }
        Ok(removed as u64)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check(Op::SetMembers)?;
        let entries = self.lock();
        match live(&entries, key, Instant::now()).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(StoreError::WrongType),
        }
    }

    async fn set_remove(&self, key: &str, value: &str) -> Result<u64, StoreError> {
        self.check(Op::SetRemove)?;
        let mut entries = self.lock();
        purge_if_expired(&mut entries, key, Instant::now());

        let members = match entries.get_mut(key).map(|e| &mut e.value) {
            None => return Ok(0),
            Some(Value::Set(members)) => members,
            Some(_) => return Err(StoreError::WrongType),
        };

        let removed = members.remove(value);
        if members.is_empty() {
            entries.remove(key);
        }
        Ok(u64::from(removed))
    }
}
