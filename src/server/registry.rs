//! Live-object registry
//!
//! Owns every server-side database object a client can address. Keys come
//! from a monotonic counter and are never reused, so a key that stops
//! resolving stays stale forever.
//!
//! Each entry carries an async mutex that serializes operations on that
//! object. The slot inside it becomes `None` once the object is closed;
//! a caller that was queued on the guard then sees a stale reference.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;

use super::cursor::Cursor;
use crate::database::{DbConnection, DbPreparedStatement, DbStatement, DriverResult};
use crate::driver::{ClassType, ObjectKey};
use crate::error::{ServerError, ServerResult};

pub enum LiveObject {
    Connection(Box<dyn DbConnection>),
    Statement(Box<dyn DbStatement>),
    PreparedStatement(Box<dyn DbPreparedStatement>),
    ResultSet(Cursor),
}

impl LiveObject {
    pub fn class_type(&self) -> ClassType {
        match self {
            LiveObject::Connection(_) => ClassType::Connection,
            LiveObject::Statement(_) => ClassType::Statement,
            LiveObject::PreparedStatement(_) => ClassType::PreparedStatement,
            LiveObject::ResultSet(_) => ClassType::ResultSet,
        }
    }

    fn close(&mut self) -> DriverResult<()> {
        match self {
            LiveObject::Connection(conn) => conn.close(),
            LiveObject::Statement(stmt) => stmt.close(),
            LiveObject::PreparedStatement(stmt) => stmt.close(),
            LiveObject::ResultSet(cursor) => cursor.close(),
        }
    }
}

pub type ObjectGuard = OwnedMutexGuard<Option<LiveObject>>;

pub struct RegistryEntry {
    pub key: ObjectKey,
    pub class_type: ClassType,
    pub parent: Option<ObjectKey>,
    /// The connection this object ultimately belongs to (itself for roots)
    pub root: ObjectKey,
    pub created_at: Instant,
    last_access: Mutex<Instant>,
    /// Only roots carry one
    idle_timeout: Option<Duration>,
    children: Mutex<Vec<ObjectKey>>,
    slot: Arc<tokio::sync::Mutex<Option<LiveObject>>>,
}

impl RegistryEntry {
    fn new(
        key: ObjectKey,
        parent: Option<ObjectKey>,
        root: ObjectKey,
        idle_timeout: Option<Duration>,
        object: LiveObject,
    ) -> Self {
        let now = Instant::now();
        Self {
            key,
            class_type: object.class_type(),
            parent,
            root,
            created_at: now,
            last_access: Mutex::new(now),
            idle_timeout,
            children: Mutex::new(Vec::new()),
            slot: Arc::new(tokio::sync::Mutex::new(Some(object))),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    fn is_idle(&self) -> bool {
        self.idle_timeout
            .is_some_and(|timeout| self.idle_for() > timeout)
    }
}

pub struct ObjectRegistry {
    entries: DashMap<ObjectKey, Arc<RegistryEntry>>,
    next_key: AtomicI32,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub(crate) fn starting_at(first_key: i32) -> Self {
        Self {
            entries: DashMap::new(),
            next_key: AtomicI32::new(first_key),
        }
    }

    fn allocate_key(&self) -> ServerResult<ObjectKey> {
        self.next_key
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |k| k.checked_add(1))
            .map(ObjectKey)
            .map_err(|_| ServerError::KeysExhausted)
    }

    /// Register a freshly opened connection. On failure the object is closed.
    pub async fn register_root(
        &self,
        object: LiveObject,
        idle_timeout: Duration,
    ) -> ServerResult<ObjectKey> {
        let key = match self.allocate_key() {
            Ok(key) => key,
            Err(e) => {
                close_object(None, object).await;
                return Err(e);
            }
        };
        let entry = RegistryEntry::new(key, None, key, Some(idle_timeout), object);
        self.entries.insert(key, Arc::new(entry));
        Ok(key)
    }

    /// Register `object` under `parent`. The caller must hold the parent's
    /// guard. If the parent has left the registry the object is closed.
    pub async fn register_child(
        &self,
        parent: &RegistryEntry,
        object: LiveObject,
    ) -> ServerResult<ObjectKey> {
        if !self.entries.contains_key(&parent.key) {
            close_object(None, object).await;
            return Err(ServerError::StaleReference(parent.key));
        }
        let key = match self.allocate_key() {
            Ok(key) => key,
            Err(e) => {
                close_object(None, object).await;
                return Err(e);
            }
        };
        let entry = RegistryEntry::new(key, Some(parent.key), parent.root, None, object);
        parent.children.lock().push(key);
        self.entries.insert(key, Arc::new(entry));
        Ok(key)
    }

    pub fn resolve(&self, key: ObjectKey) -> ServerResult<Arc<RegistryEntry>> {
        self.entries
            .get(&key)
            .map(|e| e.value().clone())
            .ok_or(ServerError::StaleReference(key))
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn roots(&self) -> Vec<Arc<RegistryEntry>> {
        self.entries
            .iter()
            .filter(|e| e.is_root())
            .map(|e| e.value().clone())
            .collect()
    }

    /// Mark `entry` and its root as used just now
    pub fn touch(&self, entry: &RegistryEntry) {
        let now = Instant::now();
        *entry.last_access.lock() = now;
        if entry.root != entry.key {
            if let Some(root) = self.entries.get(&entry.root) {
                *root.last_access.lock() = now;
            }
        }
    }

    /// Wait for exclusive use of `entry`
    pub async fn acquire(&self, entry: &RegistryEntry) -> ServerResult<ObjectGuard> {
        let guard = entry.slot.clone().lock_owned().await;
        if guard.is_none() {
            return Err(ServerError::StaleReference(entry.key));
        }
        Ok(guard)
    }

    pub async fn close(&self, key: ObjectKey) -> ServerResult<()> {
        let entry = self.resolve(key)?;
        let guard = self.acquire(&entry).await?;
        self.close_held(&entry, guard).await;
        Ok(())
    }

    /// Close `entry`, whose guard the caller holds, after closing all of its
    /// descendants depth-first. Close errors are logged, never returned.
    pub async fn close_held(&self, entry: &RegistryEntry, guard: ObjectGuard) {
        self.close_tree(entry, guard, &mut HashMap::new()).await;
    }

    /// `close_held`, taking descendant guards from `held` before waiting on them
    fn close_tree<'a>(
        &'a self,
        entry: &'a RegistryEntry,
        mut guard: ObjectGuard,
        held: &'a mut HashMap<ObjectKey, ObjectGuard>,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let children = std::mem::take(&mut *entry.children.lock());
            for child_key in children {
                let Ok(child) = self.resolve(child_key) else {
                    continue;
                };
                let child_guard = match held.remove(&child_key) {
                    Some(guard) => guard,
                    None => child.slot.clone().lock_owned().await,
                };
                if child_guard.is_none() {
                    continue;
                }
                self.close_tree(&child, child_guard, &mut *held).await;
            }

            if let Some(object) = guard.take() {
                close_object(Some(entry.key), object).await;
            }
            drop(guard);

            self.entries.remove(&entry.key);
            if let Some(parent) = entry.parent.and_then(|p| self.resolve(p).ok()) {
                parent.children.lock().retain(|k| *k != entry.key);
            }
            tracing::debug!("Closed {} {}", entry.class_type, entry.key);
        })
    }

    /// Try-lock every live descendant of `entry` into `held`. Returns false
    /// as soon as one is in use.
    fn try_lock_descendants(
        &self,
        entry: &RegistryEntry,
        held: &mut HashMap<ObjectKey, ObjectGuard>,
    ) -> bool {
        let children = entry.children.lock().clone();
        for child_key in children {
            let Ok(child) = self.resolve(child_key) else {
                continue;
            };
            let Ok(guard) = child.slot.clone().try_lock_owned() else {
                return false;
            };
            if guard.is_none() {
                continue;
            }
            held.insert(child_key, guard);
            if !self.try_lock_descendants(&child, held) {
                return false;
            }
        }
        true
    }

    /// Evict `entry` if it is still idle and no object of its session is in
    /// use right now. Never waits on a guard. Returns whether it was evicted.
    pub async fn evict_if_idle(&self, entry: &RegistryEntry) -> bool {
        let Ok(guard) = entry.slot.clone().try_lock_owned() else {
            return false;
        };
        if guard.is_none() || !entry.is_idle() {
            return false;
        }
        let mut held = HashMap::new();
        if !self.try_lock_descendants(entry, &mut held) {
            tracing::debug!("Session {} is idle but a child call is running", entry.key);
            return false;
        }
        self.close_tree(entry, guard, &mut held).await;
        true
    }

    /// Whether `entry` is past its idle timeout
    pub fn is_idle(&self, entry: &RegistryEntry) -> bool {
        entry.is_idle()
    }

    /// Close every session, waiting for in-flight calls to finish
    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for root in self.roots() {
            if self.close(root.key).await.is_ok() {
                closed += 1;
            }
        }
        closed
    }
}

/// Run the blocking close of `object` off the async workers
async fn close_object(key: Option<ObjectKey>, object: LiveObject) {
    let class_type = object.class_type();
    let result = tokio::task::spawn_blocking(move || {
        let mut object = object;
        object.close()
    })
    .await;

    let label = key.map(|k| k.to_string()).unwrap_or_else(|| "(unregistered)".into());
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Error closing {} {}: {}", class_type, label, e),
        Err(e) => tracing::error!("Close task for {} {} failed: {}", class_type, label, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::cursor::tests::MockResultSet;
    use std::sync::atomic::AtomicUsize;

    const HOUR: Duration = Duration::from_secs(3600);

    fn object() -> (LiveObject, Arc<AtomicUsize>) {
        let rs = MockResultSet::with_rows(3);
        let closed = rs.closed.clone();
        (LiveObject::ResultSet(Cursor::new(Box::new(rs))), closed)
    }

    #[tokio::test]
    async fn test_keys_are_monotonic_and_never_reused() {
        let registry = ObjectRegistry::new();
        let (a, _) = object();
        let (b, _) = object();

        let k1 = registry.register_root(a, HOUR).await.unwrap();
        assert_eq!(k1, ObjectKey(1));
        registry.close(k1).await.unwrap();

        let k2 = registry.register_root(b, HOUR).await.unwrap();
        assert_eq!(k2, ObjectKey(2));
        assert!(matches!(
            registry.resolve(k1),
            Err(ServerError::StaleReference(ObjectKey(1)))
        ));
        assert!(registry.close(k1).await.is_err());
    }

    #[tokio::test]
    async fn test_cascade_close() {
        let registry = ObjectRegistry::new();
        let (root_obj, root_closed) = object();
        let (child_obj, child_closed) = object();
        let (grand_obj, grand_closed) = object();

        let root = registry.register_root(root_obj, HOUR).await.unwrap();
        let root_entry = registry.resolve(root).unwrap();
        let child = registry.register_child(&root_entry, child_obj).await.unwrap();
        let child_entry = registry.resolve(child).unwrap();
        let grand = registry.register_child(&child_entry, grand_obj).await.unwrap();

        assert_eq!(registry.resolve(grand).unwrap().root, root);
        assert_eq!(registry.len(), 3);

        registry.close(root).await.unwrap();

        assert!(registry.is_empty());
        for key in [root, child, grand] {
            assert!(registry.resolve(key).is_err());
        }
        for closed in [root_closed, child_closed, grand_closed] {
            assert_eq!(closed.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_closing_child_detaches_it_from_parent() {
        let registry = ObjectRegistry::new();
        let (root_obj, _) = object();
        let (child_obj, child_closed) = object();

        let root = registry.register_root(root_obj, HOUR).await.unwrap();
        let root_entry = registry.resolve(root).unwrap();
        let child = registry.register_child(&root_entry, child_obj).await.unwrap();

        registry.close(child).await.unwrap();
        assert!(root_entry.children.lock().is_empty());

        registry.close(root).await.unwrap();
        assert_eq!(child_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_child_of_closed_parent_is_rejected_and_closed() {
        let registry = ObjectRegistry::new();
        let (root_obj, _) = object();
        let (orphan, orphan_closed) = object();

        let root = registry.register_root(root_obj, HOUR).await.unwrap();
        let root_entry = registry.resolve(root).unwrap();
        registry.close(root).await.unwrap();

        let err = registry.register_child(&root_entry, orphan).await.unwrap_err();
        assert!(matches!(err, ServerError::StaleReference(k) if k == root));
        assert_eq!(orphan_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queued_caller_sees_stale_after_close() {
        let registry = ObjectRegistry::new();
        let (obj, _) = object();
        let key = registry.register_root(obj, HOUR).await.unwrap();

        let entry = registry.resolve(key).unwrap();
        registry.close(key).await.unwrap();
        assert!(matches!(
            registry.acquire(&entry).await,
            Err(ServerError::StaleReference(_))
        ));
    }

    #[tokio::test]
    async fn test_touching_child_refreshes_root() {
        let registry = ObjectRegistry::new();
        let (root_obj, _) = object();
        let (child_obj, _) = object();

        let root = registry.register_root(root_obj, Duration::from_millis(30)).await.unwrap();
        let root_entry = registry.resolve(root).unwrap();
        let child = registry.register_child(&root_entry, child_obj).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_idle(&root_entry));

        registry.touch(&registry.resolve(child).unwrap());
        assert!(!registry.is_idle(&root_entry));
    }

    #[tokio::test]
    async fn test_evict_skips_busy_and_fresh_entries() {
        let registry = ObjectRegistry::new();
        let (obj, closed) = object();
        let key = registry.register_root(obj, Duration::from_millis(20)).await.unwrap();
        let entry = registry.resolve(key).unwrap();

        // fresh
        assert!(!registry.evict_if_idle(&entry).await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        let guard = registry.acquire(&entry).await.unwrap();
        // busy
        assert!(!registry.evict_if_idle(&entry).await);
        drop(guard);

        assert!(registry.evict_if_idle(&entry).await);
        assert!(registry.resolve(key).is_err());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evict_skips_session_with_busy_child() {
        let registry = ObjectRegistry::new();
        let (root_obj, _) = object();
        let (child_obj, child_closed) = object();
        let (grandchild_obj, _) = object();
        let root = registry.register_root(root_obj, Duration::from_millis(20)).await.unwrap();
        let root_entry = registry.resolve(root).unwrap();
        let child = registry.register_child(&root_entry, child_obj).await.unwrap();
        let child_entry = registry.resolve(child).unwrap();
        let grandchild = registry
            .register_child(&child_entry, grandchild_obj)
            .await
            .unwrap();
        let grandchild_entry = registry.resolve(grandchild).unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        let busy = registry.acquire(&grandchild_entry).await.unwrap();

        let evicted = tokio::time::timeout(Duration::from_millis(300), registry.evict_if_idle(&root_entry))
            .await
            .expect("eviction must not wait on a busy child");
        assert!(!evicted);
        assert_eq!(registry.len(), 3);
        assert_eq!(child_closed.load(Ordering::SeqCst), 0);
        // the skipped pass released the guards it took
        drop(registry.acquire(&child_entry).await.unwrap());

        drop(busy);
        assert!(registry.evict_if_idle(&root_entry).await);
        assert!(registry.is_empty());
        assert_eq!(child_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_key_space_exhaustion() {
        let registry = ObjectRegistry::starting_at(i32::MAX - 1);
        let (a, _) = object();
        let (b, b_closed) = object();

        assert_eq!(
            registry.register_root(a, HOUR).await.unwrap(),
            ObjectKey(i32::MAX - 1)
        );
        let err = registry.register_root(b, HOUR).await.unwrap_err();
        assert!(matches!(err, ServerError::KeysExhausted));
        assert_eq!(b_closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = ObjectRegistry::new();
        for _ in 0..3 {
            let (obj, _) = object();
            registry.register_root(obj, HOUR).await.unwrap();
        }
        assert_eq!(registry.close_all().await, 3);
        assert!(registry.is_empty());
    }
}
