use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::broker::BrokerClient;

/// 内存Broker实现
///
/// 与[`crate::RedisBroker`]可见语义一致：相同的absent/present结果、
/// 相同的TTL约定（-1永不过期，-2键不存在）、支持条件变量驱动的阻塞弹出。
/// 用于单元测试与无外部依赖的嵌入式部署。
#[derive(Default)]
pub struct MemoryBroker {
    store: Mutex<Store>,
    list_ready: Condvar,
}

#[derive(Default)]
struct Store {
    strings: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    expires: HashMap<String, Instant>,
}

impl Store {
    /// 惰性清除到期键
    fn purge(&mut self, key: &str) {
        if let Some(&deadline) = self.expires.get(key) {
            if Instant::now() >= deadline {
                self.expires.remove(key);
                self.strings.remove(key);
                self.lists.remove(key);
                self.sets.remove(key);
                self.zsets.remove(key);
            }
        }
    }

    fn holds(&self, key: &str) -> bool {
        self.strings.contains_key(key)
            || self.lists.get(key).is_some_and(|l| !l.is_empty())
            || self.sets.get(key).is_some_and(|s| !s.is_empty())
            || self.zsets.get(key).is_some_and(|z| !z.is_empty())
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 原子加减的公共实现；现有值无法解析时按0处理
    fn add_to_counter(&self, key: &str, delta: i64) -> i64 {
        let mut store = self.lock();
        store.purge(key);
        let current: i64 = store
            .strings
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let next = current + delta;
        store.strings.insert(key.to_string(), next.to_string());
        next
    }
}

impl BrokerClient for MemoryBroker {
    fn ping(&self) -> bool {
        true
    }

    fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool {
        let mut store = self.lock();
        store.strings.insert(key.to_string(), value.to_string());
        if ttl_seconds > 0 {
            store.expires.insert(
                key.to_string(),
                Instant::now() + Duration::from_secs(ttl_seconds),
            );
        } else {
            store.expires.remove(key);
        }
        true
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut store = self.lock();
        store.purge(key);
        store.strings.get(key).cloned()
    }

    fn del(&self, key: &str) -> i64 {
        let mut store = self.lock();
        store.purge(key);
        let held = store.holds(key);
        store.strings.remove(key);
        store.lists.remove(key);
        store.sets.remove(key);
        store.zsets.remove(key);
        store.expires.remove(key);
        i64::from(held)
    }

    fn del_many(&self, keys: &[String]) -> i64 {
        keys.iter().map(|key| self.del(key)).sum()
    }

    fn exists(&self, key: &str) -> bool {
        let mut store = self.lock();
        store.purge(key);
        store.holds(key)
    }

    fn expire(&self, key: &str, seconds: i64) -> bool {
        let mut store = self.lock();
        store.purge(key);
        if !store.holds(key) {
            return false;
        }
        if seconds <= 0 {
            // 与Redis一致：非正TTL立即删除
            drop(store);
            self.del(key);
            return true;
        }
        store.expires.insert(
            key.to_string(),
            Instant::now() + Duration::from_secs(seconds as u64),
        );
        true
    }

    fn ttl(&self, key: &str) -> i64 {
        let mut store = self.lock();
        store.purge(key);
        if !store.holds(key) {
            return -2;
        }
        match store.expires.get(key) {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()).as_secs() as i64,
            None => -1,
        }
    }

    fn lpush(&self, key: &str, value: &str) -> i64 {
        let mut store = self.lock();
        store.purge(key);
        let list = store.lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        let len = list.len() as i64;
        drop(store);
        // 多个brpop等待者可能在等不同的键，统一唤醒让各自重查谓词
        self.list_ready.notify_all();
        len
    }

    fn rpop(&self, key: &str) -> Option<String> {
        let mut store = self.lock();
        store.purge(key);
        let list = store.lists.get_mut(key)?;
        let value = list.pop_back();
        if list.is_empty() {
            store.lists.remove(key);
        }
        value
    }

    fn brpop(&self, key: &str, timeout_seconds: u64) -> Option<String> {
        let deadline = if timeout_seconds == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(timeout_seconds))
        };
        let mut store = self.lock();
        loop {
            store.purge(key);
            if let Some(list) = store.lists.get_mut(key) {
                if let Some(value) = list.pop_back() {
                    if list.is_empty() {
                        store.lists.remove(key);
                    }
                    return Some(value);
                }
            }
            match deadline {
                None => {
                    store = self
                        .list_ready
                        .wait(store)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!("brpop timed out on {}", key);
                        return None;
                    }
                    let (guard, _) = self
                        .list_ready
                        .wait_timeout(store, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    store = guard;
                }
            }
        }
    }

    fn llen(&self, key: &str) -> i64 {
        let mut store = self.lock();
        store.purge(key);
        store.lists.get(key).map(|l| l.len() as i64).unwrap_or(0)
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Vec<String> {
        let mut store = self.lock();
        store.purge(key);
        let Some(list) = store.lists.get(key) else {
            return Vec::new();
        };
        let len = list.len() as i64;
        let normalize = |index: i64| -> i64 {
            if index < 0 {
                (len + index).max(0)
            } else {
                index
            }
        };
        let start = normalize(start);
        let stop = normalize(stop).min(len - 1);
        if start > stop || start >= len {
            return Vec::new();
        }
        list.iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect()
    }

    fn sadd(&self, key: &str, member: &str) -> i64 {
        let mut store = self.lock();
        store.purge(key);
        let set = store.sets.entry(key.to_string()).or_default();
        i64::from(set.insert(member.to_string()))
    }

    fn sismember(&self, key: &str, member: &str) -> bool {
        let mut store = self.lock();
        store.purge(key);
        store.sets.get(key).is_some_and(|s| s.contains(member))
    }

    fn srem(&self, key: &str, member: &str) -> i64 {
        let mut store = self.lock();
        store.purge(key);
        match store.sets.get_mut(key) {
            Some(set) => i64::from(set.remove(member)),
            None => 0,
        }
    }

    fn scard(&self, key: &str) -> i64 {
        let mut store = self.lock();
        store.purge(key);
        store.sets.get(key).map(|s| s.len() as i64).unwrap_or(0)
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> bool {
        let mut store = self.lock();
        store.purge(key);
        store
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        true
    }

    fn zpopmax(&self, key: &str) -> Option<(String, f64)> {
        let mut store = self.lock();
        store.purge(key);
        let zset = store.zsets.get_mut(key)?;
        // 分数相同时与Redis一致，弹出字典序最大的成员
        let (member, score) = zset
            .iter()
            .max_by(|(ma, sa), (mb, sb)| sa.total_cmp(sb).then_with(|| ma.cmp(mb)))
            .map(|(m, s)| (m.clone(), *s))?;
        zset.remove(&member);
        if zset.is_empty() {
            store.zsets.remove(key);
        }
        Some((member, score))
    }

    fn zcard(&self, key: &str) -> i64 {
        let mut store = self.lock();
        store.purge(key);
        store.zsets.get(key).map(|z| z.len() as i64).unwrap_or(0)
    }

    fn incr(&self, key: &str) -> i64 {
        self.add_to_counter(key, 1)
    }

    fn decr(&self, key: &str) -> i64 {
        self.add_to_counter(key, -1)
    }
}
