//! Rotating session pool with error-based eviction
//!
//! A session is a reusable identity context (cookies, headers, optional
//! proxy) rotated across requests to spread rate-limiting and blocking risk.
//! Sessions accumulate an error count; at `max_error_count` they become
//! blocked and are evicted. Continued success decrements the count, so a
//! session can recover credibility.
//!
//! Expiry (TTL since creation) and blocking (error threshold) are independent
//! eviction axes. The pool size limit is a soft target: when every pooled
//! session is blocked, a fresh one is created anyway so the crawl can make
//! progress.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A reusable identity context handed out by the pool
#[derive(Debug, Clone)]
pub struct Session {
    /// Pool-unique identifier
    pub id: String,

    /// Cookie jar contents carried between requests
    pub cookies: HashMap<String, String>,

    /// Default headers applied by the executor
    pub headers: HashMap<String, String>,

    /// Optional proxy binding
    pub proxy_url: Option<String>,

    /// Consecutive-ish error count (decremented on success, floored at 0)
    pub error_count: u32,

    /// Error threshold at which the session is considered blocked
    pub max_error_count: u32,

    /// Creation time, used for TTL expiry
    pub created_at: Instant,

    /// Last time the session was handed out or updated
    pub last_used: Instant,
}

impl Session {
    fn new(max_error_count: u32) -> Self {
        let now = Instant::now();
        let mut headers = HashMap::new();
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        );
        headers.insert("Accept-Language".to_string(), "en-US,en;q=0.5".to_string());

        Self {
            id: Uuid::new_v4().to_string(),
            cookies: HashMap::new(),
            headers,
            proxy_url: None,
            error_count: 0,
            max_error_count,
            created_at: now,
            last_used: now,
        }
    }

    /// True once the error count has reached the blocking threshold
    pub fn is_blocked(&self) -> bool {
        self.error_count >= self.max_error_count
    }
}

/// Session pool configuration
#[derive(Debug, Clone)]
pub struct SessionPoolOptions {
    /// Soft ceiling on the number of pooled sessions
    pub max_pool_size: usize,

    /// Session lifetime from creation
    pub session_ttl: Duration,

    /// Error threshold for new sessions
    pub max_error_count: u32,

    /// Interval of the background expiry sweep
    pub sweep_interval: Duration,
}

impl Default for SessionPoolOptions {
    fn default() -> Self {
        Self {
            max_pool_size: 1000,
            session_ttl: Duration::from_secs(1800),
            max_error_count: 5,
            sweep_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Default)]
struct PoolState {
    sessions: HashMap<String, Session>,
    available: VecDeque<String>,
}

/// Rotating pool of sessions with health tracking
///
/// Callers receive session clones; health updates go back through the pool by
/// session id so the pooled copy stays authoritative.
pub struct SessionPool {
    options: SessionPoolOptions,
    state: Mutex<PoolState>,
}

impl SessionPool {
    /// Creates an empty pool
    pub fn new(options: SessionPoolOptions) -> Self {
        Self {
            options,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Hands out a usable session
    ///
    /// Preference order: a previously returned healthy session, a freshly
    /// created one while under the size limit, the least recently used
    /// non-blocked session, and finally a fresh session regardless of the
    /// limit. A blocked session is never handed out.
    pub fn get_session(&self) -> Session {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        // Drain the available queue until a healthy session surfaces; stale
        // entries are evicted on the way.
        while let Some(id) = state.available.pop_front() {
            let usable = match state.sessions.get(&id) {
                Some(s) => !s.is_blocked() && !self.is_expired(s, now),
                None => continue,
            };
            if usable {
                if let Some(session) = state.sessions.get_mut(&id) {
                    session.last_used = now;
                    return session.clone();
                }
                continue;
            }
            state.sessions.remove(&id);
            tracing::debug!("Evicted stale session {}", id);
        }

        if state.sessions.len() < self.options.max_pool_size {
            let session = Session::new(self.options.max_error_count);
            tracing::debug!("Created new session {}", session.id);
            state.sessions.insert(session.id.clone(), session.clone());
            return session;
        }

        // Pool full: reuse the least recently used non-blocked session
        let lru_id = state
            .sessions
            .values()
            .filter(|s| !s.is_blocked())
            .min_by_key(|s| s.last_used)
            .map(|s| s.id.clone());

        if let Some(session) = lru_id.and_then(|id| state.sessions.get_mut(&id)) {
            session.last_used = now;
            return session.clone();
        }

        // Everything is blocked; the size limit is a soft target, so create
        // one anyway to keep the crawl moving.
        let session = Session::new(self.options.max_error_count);
        tracing::warn!(
            "Session pool full of blocked sessions, creating {} past the limit",
            session.id
        );
        state.sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Returns a session to the pool after use
    ///
    /// Healthy, unexpired sessions become available for reuse; a blocked
    /// session is evicted immediately.
    pub fn return_session(&self, session: &Session) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        let keep = match state.sessions.get(&session.id) {
            Some(s) => {
                if s.is_blocked() {
                    false
                } else {
                    !self.is_expired(s, now)
                }
            }
            None => return,
        };

        if keep {
            state.available.push_back(session.id.clone());
        } else if state
            .sessions
            .get(&session.id)
            .map(|s| s.is_blocked())
            .unwrap_or(false)
        {
            state.sessions.remove(&session.id);
            tracing::debug!("Removed blocked session {} on return", session.id);
        }
    }

    /// Increments a session's error count, evicting it once blocked
    pub fn mark_bad(&self, session_id: &str, reason: &str) {
        let mut state = self.state.lock().unwrap();
        let blocked = match state.sessions.get_mut(session_id) {
            Some(s) => {
                s.error_count += 1;
                s.last_used = Instant::now();
                tracing::warn!(
                    "Session {} marked bad ({}), error count {}/{}",
                    session_id,
                    reason,
                    s.error_count,
                    s.max_error_count
                );
                s.is_blocked()
            }
            None => return,
        };

        if blocked {
            state.sessions.remove(session_id);
            tracing::warn!("Session {} blocked and evicted", session_id);
        }
    }

    /// Decrements a session's error count, floored at zero
    pub fn mark_good(&self, session_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(s) = state.sessions.get_mut(session_id) {
            s.error_count = s.error_count.saturating_sub(1);
            s.last_used = Instant::now();
            tracing::debug!(
                "Session {} marked good, error count {}",
                session_id,
                s.error_count
            );
        }
    }

    /// Evicts sessions past their TTL and purges orphaned available ids
    ///
    /// Called periodically by the sweeper task; also usable directly.
    pub fn sweep(&self) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        let expired: Vec<String> = state
            .sessions
            .values()
            .filter(|s| self.is_expired(s, now))
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            state.sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::debug!("Swept {} expired sessions", expired.len());
        }

        let sessions = &state.sessions;
        let retained: VecDeque<String> = state
            .available
            .iter()
            .filter(|id| sessions.contains_key(*id))
            .cloned()
            .collect();
        state.available = retained;
    }

    /// Number of sessions currently pooled
    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    /// Number of sessions queued for reuse
    pub fn available_count(&self) -> usize {
        self.state.lock().unwrap().available.len()
    }

    fn is_expired(&self, session: &Session, now: Instant) -> bool {
        now.duration_since(session.created_at) > self.options.session_ttl
    }

    /// Spawns the periodic expiry sweep for this pool
    ///
    /// The task runs until the pool is dropped by all holders.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::downgrade(self);
        let interval = self.options.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match pool.upgrade() {
                    Some(pool) => pool.sweep(),
                    None => break,
                }
            }
        })
    }
}
