//! Bounded pool of directory connections

use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::directory::{DirectoryError, DirectoryResult, ResultCode};
use super::RequestInterface;

/// Opens new connections to a directory server
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self) -> DirectoryResult<Box<dyn RequestInterface + Send>>;
}

type Connection = Box<dyn RequestInterface + Send>;

struct PoolState {
    idle: Vec<Connection>,
    /// Connections handed out or idle
    open: usize,
}

/// Connections are opened lazily up to `max_size`. Callers block until a
/// connection is released or `timeout` elapses.
pub struct ConnectionPool {
    factory: Arc<dyn ConnectionFactory>,
    max_size: usize,
    timeout: Duration,
    state: Mutex<PoolState>,
    released: Condvar,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn ConnectionFactory>, max_size: usize, timeout: Duration) -> Self {
        Self {
            factory,
            max_size: max_size.max(1),
            timeout,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                open: 0,
            }),
            released: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take a connection, opening one if the pool is not full
    pub fn acquire(&self) -> DirectoryResult<PooledConnection<'_>> {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.lock();
        loop {
            if let Some(connection) = state.idle.pop() {
                return Ok(PooledConnection::new(self, connection));
            }

            if state.open < self.max_size {
                state.open += 1;
                drop(state);
                return match self.factory.connect() {
                    Ok(connection) => {
                        debug!(max = self.max_size, "opened directory connection");
                        Ok(PooledConnection::new(self, connection))
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to open directory connection");
                        self.forget();
                        Err(e)
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DirectoryError::new(
                    ResultCode::Timeout,
                    format!("no directory connection available after {:?}", self.timeout),
                ));
            }
            state = self
                .released
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open
    }

    pub fn idle_connections(&self) -> usize {
        self.lock().idle.len()
    }

    fn release(&self, connection: Connection) {
        self.lock().idle.push(connection);
        self.released.notify_one();
    }

    /// Drop a connection slot, e.g. after a broken connection
    fn forget(&self) {
        let mut state = self.lock();
        state.open = state.open.saturating_sub(1);
        drop(state);
        self.released.notify_one();
    }
}

/// A borrowed connection, returned to the pool on drop
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    connection: Option<Connection>,
    broken: bool,
}

impl<'a> PooledConnection<'a> {
    fn new(pool: &'a ConnectionPool, connection: Connection) -> Self {
        Self {
            pool,
            connection: Some(connection),
            broken: false,
        }
    }

    /// Close the connection instead of returning it to the pool
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Deref for PooledConnection<'_> {
    type Target = dyn RequestInterface + Send;

    fn deref(&self) -> &Self::Target {
        match &self.connection {
            Some(connection) => &**connection,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if self.broken {
                debug!("discarding broken directory connection");
                self.pool.forget();
            } else {
                self.pool.release(connection);
            }
        }
    }
}
