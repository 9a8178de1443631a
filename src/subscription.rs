use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{Days, Local, NaiveDate};
use eyre::{Result, WrapErr, eyre};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// A user's paid access window
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Subscription {
    #[serde(rename = "expiry")]
    pub expiry_date: NaiveDate,
    #[serde(rename = "plan")]
    pub plan_label: String,
}

impl Subscription {
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.expiry_date > today
    }
}

/// On-disk layout: `{"users": {"<user_id>": {"expiry": "YYYY-MM-DD", "plan": "30 days"}}}`
#[derive(Debug, Default, Deserialize, Serialize)]
struct SubscriptionFile {
    #[serde(default)]
    users: BTreeMap<String, Subscription>,
}

/// Subscription records owned by one process.
///
/// All reads and writes go through a single mutex; every grant rewrites the
/// whole file atomically, so concurrent grants cannot lose each other's updates.
pub struct SubscriptionStore {
    path: PathBuf,
    admin_id: Option<u64>,
    records: Mutex<SubscriptionFile>,
}

impl SubscriptionStore {
    /// Open the store at `path`, creating an empty file if none exists
    pub fn open(path: impl Into<PathBuf>, admin_id: Option<u64>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let data = std::fs::read_to_string(&path)
                .wrap_err_with(|| format!("failed to read subscriptions from {}", path.display()))?;
            let file: SubscriptionFile = serde_json::from_str(&data)
                .wrap_err_with(|| format!("invalid subscriptions file {}", path.display()))?;
            debug!("Loaded {} subscription records from {}", file.users.len(), path.display());
            file
        } else {
            info!("Creating empty subscriptions file at {}", path.display());
            let file = SubscriptionFile::default();
            write_atomic(&path, &file)?;
            file
        };

        Ok(Self {
            path,
            admin_id,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_id == Some(user_id)
    }

    /// Whether the user may use gated features today
    pub fn is_entitled(&self, user_id: u64) -> Result<bool> {
        self.is_entitled_on(user_id, today())
    }

    pub fn is_entitled_on(&self, user_id: u64, today: NaiveDate) -> Result<bool> {
        if self.is_admin(user_id) {
            return Ok(true);
        }
        Ok(self
            .get(user_id)?
            .is_some_and(|sub| sub.is_active_on(today)))
    }

    pub fn get(&self, user_id: u64) -> Result<Option<Subscription>> {
        Ok(self.lock()?.users.get(&user_id.to_string()).cloned())
    }

    /// Set the user's expiry to today + `days`.
    ///
    /// Replaces any existing record: remaining time is not carried over.
    pub fn grant(&self, user_id: u64, days: u32) -> Result<Subscription> {
        self.grant_on(user_id, days, today())
    }

    pub fn grant_on(&self, user_id: u64, days: u32, today: NaiveDate) -> Result<Subscription> {
        let expiry_date = today
            .checked_add_days(Days::new(u64::from(days)))
            .ok_or_else(|| eyre!("{days} days from {today} is out of range"))?;
        let sub = Subscription {
            expiry_date,
            plan_label: format!("{days} days"),
        };

        let mut records = self.lock()?;
        let previous = records.users.insert(user_id.to_string(), sub.clone());
        if let Err(e) = write_atomic(&self.path, &records) {
            // keep memory and disk in agreement
            match previous {
                Some(prev) => records.users.insert(user_id.to_string(), prev),
                None => records.users.remove(&user_id.to_string()),
            };
            return Err(e);
        }

        info!("Granted {days} days to user {user_id}, expires {expiry_date}");
        Ok(sub)
    }

    fn lock(&self) -> Result<MutexGuard<'_, SubscriptionFile>> {
        self.records
            .lock()
            .map_err(|_| eyre!("subscription store lock poisoned"))
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn write_atomic(path: &Path, file: &SubscriptionFile) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;

    let data = serde_json::to_string_pretty(file)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(data.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path)
        .wrap_err_with(|| format!("failed to write subscriptions to {}", path.display()))?;
    debug!("Saved subscriptions to {}", path.display());
    Ok(())
}
