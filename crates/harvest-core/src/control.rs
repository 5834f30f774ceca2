//! Job control for cooperative pause: one pause token per active loop.
//!
//! Each crawl or download loop registers itself before it starts and holds a
//! [`LoopGuard`] for as long as it runs. A pause request trips the token; the
//! loop checks it at its next boundary (before a page, gallery, or asset) and
//! winds down. An in-flight collaborator call is never interrupted.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_ID: AtomicU64 = AtomicU64::new(0);

/// Creation-time job token: the current Unix time in milliseconds, bumped
/// when two jobs are created within the same millisecond.
pub fn new_job_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_ID.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next.to_string(),
            Err(seen) => last = seen,
        }
    }
}

/// Cloneable flag shared between a loop and whoever may pause it.
#[derive(Debug, Clone, Default)]
pub struct PauseToken(Arc<AtomicBool>);

impl PauseToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Shared registry of job id -> pause token for loops that are currently active.
#[derive(Debug)]
pub struct JobControl<K> {
    jobs: Mutex<HashMap<K, PauseToken>>,
}

impl<K> Default for JobControl<K> {
    fn default() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> JobControl<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an active loop for `job_id`. Returns None if a loop for that job
    /// is already registered, which keeps at most one loop per job.
    pub fn register(self: &Arc<Self>, job_id: K) -> Option<LoopGuard<K>> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&job_id) {
            return None;
        }
        let token = PauseToken::new();
        jobs.insert(job_id.clone(), token.clone());
        Some(LoopGuard {
            control: Arc::clone(self),
            job_id,
            token,
        })
    }

    /// True while a loop for `job_id` holds its guard.
    pub fn is_active(&self, job_id: &K) -> bool {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(job_id)
    }

    /// Ask the active loop for `job_id` to stop at its next boundary.
    /// Returns false if no loop is registered for the job.
    pub fn request_pause(&self, job_id: &K) -> bool {
        match self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
        {
            Some(token) => {
                token.request();
                true
            }
            None => false,
        }
    }

    /// Ask every active loop to stop (e.g. on Ctrl-C).
    pub fn request_pause_all(&self) -> usize {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        for token in jobs.values() {
            token.request();
        }
        jobs.len()
    }

    /// Ids of jobs with an active loop.
    pub fn active_ids(&self) -> Vec<K> {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn unregister(&self, job_id: &K) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id);
    }
}

/// Unregisters the loop's pause token when dropped.
#[derive(Debug)]
pub struct LoopGuard<K: Eq + Hash + Clone> {
    control: Arc<JobControl<K>>,
    job_id: K,
    token: PauseToken,
}

impl<K: Eq + Hash + Clone> LoopGuard<K> {
    pub fn token(&self) -> &PauseToken {
        &self.token
    }

    pub fn pause_requested(&self) -> bool {
        self.token.is_requested()
    }
}

impl<K: Eq + Hash + Clone> Drop for LoopGuard<K> {
    fn drop(&mut self) {
        self.control.unregister(&self.job_id);
    }
}
