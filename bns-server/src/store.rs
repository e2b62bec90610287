use {
    std::{
        ops::Deref,
        path::{Path, PathBuf},
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    },
    tracing::{info, warn, error},
    crossbeam::channel::{self, Sender, Receiver},
    rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params},
    crate::error::{StoreError, StoreOpenError},
};

pub const IN_MEMORY: &str = ":memory:";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const SQL_CREATE_TABLE: &str = "create table if not exists builds (
    project_name text primary key,
    build_number integer not null default 0 check (build_number >= 0)
)";
const SQL_SELECT: &str = "select build_number from builds where project_name = ?1";
const SQL_INSERT_IF_ABSENT: &str = "insert into builds (project_name, build_number) values (?1, 0)
    on conflict (project_name) do nothing";
// a counter sitting at i64::MAX matches no row in the update branch, so nothing is returned
const SQL_INCREMENT: &str = "insert into builds (project_name, build_number) values (?1, 1)
    on conflict (project_name) do update set build_number = build_number + 1
    where build_number < 9223372036854775807
    returning build_number";
const SQL_SET: &str = "insert into builds (project_name, build_number) values (?1, ?2)
    on conflict (project_name) do update set build_number = excluded.build_number";

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum StoreLocation {
    InMemory,
    File(PathBuf),
}

impl StoreLocation {
    pub fn parse(location: &str) -> Self {
        if location == IN_MEMORY {
            Self::InMemory
        } else {
            Self::File(PathBuf::from(location))
        }
    }
}

/// Durable mapping of project name to build number.
///
/// All operations are safe to call from many threads at once. Each operation checks out
/// one connection from the pool and writes through a single statement or a short immediate
/// transaction, so writes to one project are serialized by the database while other
/// projects are not blocked on any lock held by this type.
pub struct CounterStore {
    pool: ConnectionPool,
}

impl CounterStore {
    pub fn open(location: &StoreLocation, pool_size: usize) -> Result<Self, StoreOpenError> {
        let connections = match location {
            // every in-memory connection is a separate database, so they cannot be pooled
            StoreLocation::InMemory => vec![open_in_memory()?],
            StoreLocation::File(path) => {
                let mut connections = Vec::new();
                for _ in 0..pool_size.max(1) {
                    connections.push(open_file(path)?);
                }
                connections
            },
        };

        if let Some(connection) = connections.first() {
            connection.execute(SQL_CREATE_TABLE, ())
                .map_err(|err| StoreOpenError::DatabaseInit { reason: err.to_string() })?;
        }

        info!("opened counter store at {location:?} with {} connection(s)", connections.len());
        Ok(Self { pool: ConnectionPool::new(connections) })
    }

    pub fn in_memory() -> Result<Self, StoreOpenError> {
        Self::open(&StoreLocation::InMemory, 1)
    }

    /// Returns the current build number, creating the project with 0 if it is unknown.
    pub fn get_or_create(&self, project: &str) -> Result<i64, StoreError> {
        let connection = self.pool.acquire()?;

        if let Some(value) = select_build_number(&connection, project)? {
            return Ok(value);
        }

        let tx = Transaction::new_unchecked(&connection, TransactionBehavior::Immediate)
            .map_err(|err| StoreError::unavailable("failed to begin transaction", err))?;

        tx.prepare_cached(SQL_INSERT_IF_ABSENT)
            .and_then(|mut stmt| stmt.execute(params![project]))
            .map_err(|err| StoreError::unavailable("failed to create project", err))?;

        let value = select_build_number(&tx, project)?
            .ok_or_else(|| StoreError::StorageUnavailable { reason: format!("project {project:?} missing right after insert") })?;

        tx.commit()
            .map_err(|err| StoreError::unavailable("failed to commit new project", err))?;

        Ok(value)
    }

    /// Adds one to the build number and returns the new value.
    pub fn increment(&self, project: &str) -> Result<i64, StoreError> {
        let connection = self.pool.acquire()?;
        let mut stmt = connection.prepare_cached(SQL_INCREMENT)
            .map_err(|err| StoreError::unavailable("failed to prepare increment", err))?;

        stmt.query_row(params![project], |row| row.get::<_, i64>(0))
            .optional()
            .map_err(|err| StoreError::unavailable("failed to increment build number", err))?
            .ok_or_else(|| StoreError::CounterOverflow { project: project.to_owned() })
    }

    /// Overwrites the build number, creating the project if it is unknown.
    pub fn set(&self, project: &str, value: i64) -> Result<(), StoreError> {
        if value < 0 {
            return Err(StoreError::NegativeBuildNumber { value });
        }

        let connection = self.pool.acquire()?;
        connection.prepare_cached(SQL_SET)
            .and_then(|mut stmt| stmt.execute(params![project, value]))
            .map_err(|err| StoreError::unavailable("failed to set build number", err))
            .map(|_| ())
    }

    /// Waits for every pooled connection to be returned and closes it. Any operation issued
    /// after this call fails with `StorageUnavailable`.
    pub fn close(&self) -> Result<(), StoreError> {
        if self.pool.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut failures = 0;
        for _ in 0..self.pool.size {
            let connection = self.pool.rx.recv_timeout(ACQUIRE_TIMEOUT)
                .map_err(|err| StoreError::unavailable("connection was not returned to the pool in time", err))?;
            if let Err((_, err)) = connection.close() {
                error!("failed to close sqlite connection: {err:?}");
                failures += 1;
            }
        }

        if failures > 0 {
            return Err(StoreError::StorageUnavailable { reason: format!("{failures} connection(s) failed to close") });
        }

        info!("counter store closed");
        Ok(())
    }
}

fn select_build_number(connection: &Connection, project: &str) -> Result<Option<i64>, StoreError> {
    connection.prepare_cached(SQL_SELECT)
        .and_then(|mut stmt| stmt.query_row(params![project], |row| row.get(0)).optional())
        .map_err(|err| StoreError::unavailable("failed to read build number", err))
}

fn open_in_memory() -> Result<Connection, StoreOpenError> {
    Connection::open_in_memory()
        .map_err(|err| StoreOpenError::ConnectionOpen { reason: err.to_string() })
}

fn open_file(path: &Path) -> Result<Connection, StoreOpenError> {
    let connection = Connection::open(path)
        .map_err(|err| StoreOpenError::ConnectionOpen { reason: format!("{path:?}: {err}") })?;
    connection.busy_timeout(BUSY_TIMEOUT)
        .map_err(|err| StoreOpenError::DatabaseInit { reason: err.to_string() })?;
    connection.execute_batch("pragma journal_mode = wal; pragma synchronous = full;")
        .map_err(|err| StoreOpenError::DatabaseInit { reason: err.to_string() })?;
    Ok(connection)
}

struct ConnectionPool {
    tx: Sender<Connection>,
    rx: Receiver<Connection>,
    size: usize,
    closed: AtomicBool,
}

impl ConnectionPool {
    fn new(connections: Vec<Connection>) -> Self {
        let size = connections.len();
        let (tx, rx) = channel::bounded(size);
        for connection in connections {
            // capacity equals the number of connections, so this never blocks
            let _ = tx.send(connection);
        }

        Self {
            tx,
            rx,
            size,
            closed: AtomicBool::new(false),
        }
    }

    fn acquire(&self) -> Result<PooledConnection<'_>, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::StorageUnavailable { reason: "counter store is closed".to_owned() });
        }

        let connection = self.rx.recv_timeout(ACQUIRE_TIMEOUT)
            .map_err(|err| StoreError::unavailable("failed to acquire sqlite connection", err))?;

        Ok(PooledConnection {
            pool: self,
            connection: Some(connection),
        })
    }
}

// returns connection to the pool when the operation is done with it
struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    connection: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_ref() {
            Some(v) => v,
            None => unreachable!("connection is only taken on drop"),
        }
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(err) = self.pool.tx.try_send(connection) {
                warn!("failed to return sqlite connection to pool: {err:?}");
            }
        }
    }
}
