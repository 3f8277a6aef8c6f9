//! Async record store with change notification.
//!
//! `TimerRepository` wraps a [`Database`] for use from async code. Every
//! call runs on tokio's blocking pool, and every successful write re-reads
//! the timer list and publishes it on a `watch` channel. Subscribers only
//! ever see the latest list: a burst of writes may be observed as one
//! change.
//!
//! Writes made by other processes (the CLI editing the same file) are not
//! seen automatically. Call [`TimerRepository::poll_external`] periodically;
//! it compares SQLite's `data_version` and republishes when it moved.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::database::{Database, Transition};
use crate::error::{CoreError, Result};
use crate::service::ServiceCommand;
use crate::timer::{Anchor, Timer, TimerId};

struct Inner {
    db: Mutex<Database>,
    changes: watch::Sender<Vec<Timer>>,
    seen_version: AtomicI64,
}

impl Inner {
    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| CoreError::Background("database mutex poisoned".into()))
    }

    /// Publish `timers` unless they equal the current list.
    ///
    /// Called with the database lock held so that lists are published in
    /// commit order.
    fn publish(&self, timers: Vec<Timer>) -> bool {
        self.changes.send_if_modified(|current| {
            if *current == timers {
                false
            } else {
                *current = timers;
                true
            }
        })
    }
}

/// Cloneable async handle to the timer store.
#[derive(Clone)]
pub struct TimerRepository {
    inner: Arc<Inner>,
}

impl TimerRepository {
    /// Wrap an open database, loading the initial list synchronously.
    pub fn new(db: Database) -> Result<Self> {
        let timers = db.list_timers()?;
        let version = db.data_version()?;
        let (changes, _) = watch::channel(timers);
        Ok(Self {
            inner: Arc::new(Inner {
                db: Mutex::new(db),
                changes,
                seen_version: AtomicI64::new(version),
            }),
        })
    }

    /// Receiver that yields the full timer list after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Timer>> {
        self.inner.changes.subscribe()
    }

    /// Last published list.
    pub fn snapshot(&self) -> Vec<Timer> {
        self.inner.changes.borrow().clone()
    }

    /// Run `f` against the locked database on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Inner, &Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let db = inner.lock()?;
            f(inner.as_ref(), &*db)
        })
        .await?
    }

    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run(move |_, db| f(db)).await
    }

    /// Like `read`, then reload and publish the list.
    async fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.run(move |inner, db| {
            let out = f(db)?;
            inner.publish(db.list_timers()?);
            Ok(out)
        })
        .await
    }

    /// Reload the list from disk and publish it if it changed.
    pub async fn refresh(&self) -> Result<()> {
        self.run(|inner, db| {
            inner.publish(db.list_timers()?);
            Ok(())
        })
        .await
    }

    /// Detect commits from other connections. Returns true if it refreshed.
    pub async fn poll_external(&self) -> Result<bool> {
        self.run(|inner, db| {
            let version = db.data_version()?;
            let previous = inner.seen_version.swap(version, Ordering::SeqCst);
            if previous == version {
                return Ok(false);
            }
            tracing::debug!(previous, version, "external change detected");
            inner.publish(db.list_timers()?);
            Ok(true)
        })
        .await
    }

    pub async fn get(&self, id: TimerId) -> Result<Option<Timer>> {
        self.read(move |db| db.get_timer(id)).await
    }

    pub async fn count_running(&self) -> Result<usize> {
        self.read(|db| db.count_running()).await
    }

    pub async fn insert(&self, timer: Timer) -> Result<TimerId> {
        self.write(move |db| db.insert_timer(&timer)).await
    }

    pub async fn start(&self, id: TimerId, now: DateTime<Utc>) -> Result<Option<Transition>> {
        self.write(move |db| db.start_timer(id, now)).await
    }

    pub async fn stop(&self, id: TimerId, now: DateTime<Utc>) -> Result<Option<Transition>> {
        self.write(move |db| db.stop_timer(id, now)).await
    }

    pub async fn reset(&self, id: TimerId, now: DateTime<Utc>) -> Result<Option<Transition>> {
        self.write(move |db| db.reset_timer(id, now)).await
    }

    pub async fn record_tick(
        &self,
        id: TimerId,
        expected: Anchor,
        remaining: u32,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.write(move |db| db.record_tick(id, expected, remaining, at))
            .await
    }

    pub async fn mark_completed(&self, id: TimerId, expected: Anchor) -> Result<bool> {
        self.write(move |db| db.mark_completed(id, expected)).await
    }

    pub async fn drain_commands(&self) -> Result<Vec<ServiceCommand>> {
        self.read(|db| db.drain_commands()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::NewTimer;
    use crate::units::TemperatureUnit;

    fn timer(name: &str) -> Timer {
        Timer::new(NewTimer {
            name: name.into(),
            duration_secs: 60,
            temperature_celsius: None,
            input_unit: TemperatureUnit::Celsius,
        })
    }

    #[tokio::test]
    async fn writes_publish_the_new_list() {
        let repo = TimerRepository::new(Database::open_memory().unwrap()).unwrap();
        let mut rx = repo.subscribe();
        assert!(rx.borrow_and_update().is_empty());

        let id = repo.insert(timer("Cookies")).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update()[0].id, id);

        repo.start(id, Utc::now()).await.unwrap();
        assert!(rx.borrow_and_update()[0].is_running);
    }

    #[tokio::test]
    async fn no_op_writes_do_not_notify() {
        let repo = TimerRepository::new(Database::open_memory().unwrap()).unwrap();
        let id = repo.insert(timer("Cookies")).await.unwrap();
        let mut rx = repo.subscribe();
        rx.borrow_and_update();

        // Stopping a stopped timer changes nothing.
        let transition = repo.stop(id, Utc::now()).await.unwrap().unwrap();
        assert!(transition.event.is_none());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn poll_external_sees_other_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timers.db");
        let repo = TimerRepository::new(Database::open_at(&path).unwrap()).unwrap();
        let mut rx = repo.subscribe();
        assert!(!repo.poll_external().await.unwrap());

        let other = Database::open_at(&path).unwrap();
        other.insert_timer(&timer("From the CLI")).unwrap();

        assert!(repo.poll_external().await.unwrap());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update()[0].name, "From the CLI");
        assert!(!repo.poll_external().await.unwrap());
    }
}
