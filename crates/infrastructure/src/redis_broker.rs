use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use redis::{Client, Connection, RedisResult};
use taskhub_core::config::BrokerConfig;
use taskhub_errors::{TaskHubError, TaskHubResult};
use tracing::{debug, warn};

use crate::broker::BrokerClient;

/// 基于redis crate的生产Broker实现
///
/// 内部持有一个连接池：checkout在池耗尽时阻塞等待空闲连接；出错的连接
/// 直接丢弃，下次checkout按需重建（上限pool_size）。每条命令独占一个
/// 连接执行，操作之间在连接内天然串行。
pub struct RedisBroker {
    client: Client,
    pool: Mutex<PoolState>,
    available: Condvar,
    config: BrokerConfig,
}

struct PoolState {
    idle: Vec<Connection>,
    /// 当前存活连接数（含借出的）
    live: usize,
}

impl std::fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroker")
            .field("config", &self.config)
            .finish()
    }
}

impl RedisBroker {
    /// 建立客户端并用PING探测连通性
    pub fn connect(config: BrokerConfig) -> TaskHubResult<Self> {
        let client = Client::open(config.url())
            .map_err(|e| TaskHubError::broker_unavailable(format!("创建Redis客户端失败: {e}")))?;

        let broker = Self {
            client,
            pool: Mutex::new(PoolState {
                idle: Vec::new(),
                live: 0,
            }),
            available: Condvar::new(),
            config,
        };

        if !broker.ping() {
            return Err(TaskHubError::broker_unavailable(format!(
                "无法连接到broker {}:{}",
                broker.config.host, broker.config.port
            )));
        }
        debug!(
            "Connected to broker at {}:{}",
            broker.config.host, broker.config.port
        );
        Ok(broker)
    }

    fn open_connection(&self) -> RedisResult<Connection> {
        let conn = self
            .client
            .get_connection_with_timeout(Duration::from_millis(self.config.connect_timeout_ms))?;
        let socket_timeout = Some(Duration::from_millis(self.config.socket_timeout_ms));
        conn.set_read_timeout(socket_timeout)?;
        conn.set_write_timeout(socket_timeout)?;
        Ok(conn)
    }

    /// 取出一个连接；池耗尽时阻塞，无法建连时返回None
    fn checkout(&self) -> Option<Connection> {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(conn) = pool.idle.pop() {
                return Some(conn);
            }
            if pool.live < self.config.pool_size {
                pool.live += 1;
                drop(pool);
                match self.open_connection() {
                    Ok(conn) => return Some(conn),
                    Err(e) => {
                        warn!("Failed to open broker connection: {e}");
                        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
                        pool.live -= 1;
                        drop(pool);
                        self.available.notify_one();
                        return None;
                    }
                }
            }
            pool = self
                .available
                .wait(pool)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 归还连接；None表示连接已不可用，从池中除名
    fn checkin(&self, conn: Option<Connection>) {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        match conn {
            Some(conn) => pool.idle.push(conn),
            None => pool.live -= 1,
        }
        drop(pool);
        self.available.notify_one();
    }

    /// 执行单条命令；传输错误时丢弃连接并返回None
    fn run<T: redis::FromRedisValue>(&self, cmd: &redis::Cmd) -> Option<T> {
        let mut conn = self.checkout()?;
        match cmd.query::<T>(&mut conn) {
            Ok(value) => {
                self.checkin(Some(conn));
                Some(value)
            }
            Err(e) => {
                warn!("Broker command failed: {e}");
                self.checkin(None);
                None
            }
        }
    }
}

impl BrokerClient for RedisBroker {
    fn ping(&self) -> bool {
        let cmd = redis::cmd("PING");
        self.run::<String>(&cmd).map(|r| r == "PONG").unwrap_or(false)
    }

    fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if ttl_seconds > 0 {
            cmd.arg("EX").arg(ttl_seconds);
        }
        self.run::<String>(&cmd).map(|r| r == "OK").unwrap_or(false)
    }

    fn get(&self, key: &str) -> Option<String> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run::<Option<String>>(&cmd).flatten()
    }

    fn del(&self, key: &str) -> i64 {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.run::<i64>(&cmd).unwrap_or(0)
    }

    fn del_many(&self, keys: &[String]) -> i64 {
        if keys.is_empty() {
            return 0;
        }
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(key);
        }
        self.run::<i64>(&cmd).unwrap_or(0)
    }

    fn exists(&self, key: &str) -> bool {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        self.run::<i64>(&cmd).map(|n| n > 0).unwrap_or(false)
    }

    fn expire(&self, key: &str, seconds: i64) -> bool {
        let mut cmd = redis::cmd("EXPIRE");
        cmd.arg(key).arg(seconds);
        self.run::<i64>(&cmd).map(|n| n == 1).unwrap_or(false)
    }

    fn ttl(&self, key: &str) -> i64 {
        let mut cmd = redis::cmd("TTL");
        cmd.arg(key);
        // 传输失败按键不存在处理
        self.run::<i64>(&cmd).unwrap_or(-2)
    }

    fn lpush(&self, key: &str, value: &str) -> i64 {
        let mut cmd = redis::cmd("LPUSH");
        cmd.arg(key).arg(value);
        self.run::<i64>(&cmd).unwrap_or(0)
    }

    fn rpop(&self, key: &str) -> Option<String> {
        let mut cmd = redis::cmd("RPOP");
        cmd.arg(key);
        self.run::<Option<String>>(&cmd).flatten()
    }

    fn brpop(&self, key: &str, timeout_seconds: u64) -> Option<String> {
        // BRPOP在服务端阻塞，socket读超时要放宽到阻塞时长之外
        let mut conn = self.checkout()?;
        let read_timeout = if timeout_seconds == 0 {
            None
        } else {
            Some(
                Duration::from_secs(timeout_seconds)
                    + Duration::from_millis(self.config.socket_timeout_ms.max(1000)),
            )
        };
        if conn.set_read_timeout(read_timeout).is_err() {
            self.checkin(None);
            return None;
        }

        let mut cmd = redis::cmd("BRPOP");
        cmd.arg(key).arg(timeout_seconds);
        let result = cmd.query::<Option<(String, String)>>(&mut conn);

        let restored = conn
            .set_read_timeout(Some(Duration::from_millis(self.config.socket_timeout_ms)))
            .is_ok();
        match result {
            Ok(reply) => {
                self.checkin(if restored { Some(conn) } else { None });
                reply.map(|(_key, value)| value)
            }
            Err(e) => {
                warn!("BRPOP failed: {e}");
                self.checkin(None);
                None
            }
        }
    }

    fn llen(&self, key: &str) -> i64 {
        let mut cmd = redis::cmd("LLEN");
        cmd.arg(key);
        self.run::<i64>(&cmd).unwrap_or(0)
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Vec<String> {
        let mut cmd = redis::cmd("LRANGE");
        cmd.arg(key).arg(start).arg(stop);
        self.run::<Vec<String>>(&cmd).unwrap_or_default()
    }

    fn sadd(&self, key: &str, member: &str) -> i64 {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key).arg(member);
        self.run::<i64>(&cmd).unwrap_or(0)
    }

    fn sismember(&self, key: &str, member: &str) -> bool {
        let mut cmd = redis::cmd("SISMEMBER");
        cmd.arg(key).arg(member);
        self.run::<i64>(&cmd).map(|n| n > 0).unwrap_or(false)
    }

    fn srem(&self, key: &str, member: &str) -> i64 {
        let mut cmd = redis::cmd("SREM");
        cmd.arg(key).arg(member);
        self.run::<i64>(&cmd).unwrap_or(0)
    }

    fn scard(&self, key: &str) -> i64 {
        let mut cmd = redis::cmd("SCARD");
        cmd.arg(key);
        self.run::<i64>(&cmd).unwrap_or(0)
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> bool {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key).arg(score).arg(member);
        // 返回值是新增成员数，更新已有成员时为0；命令执行成功即视为成功
        self.run::<i64>(&cmd).is_some()
    }

    fn zpopmax(&self, key: &str) -> Option<(String, f64)> {
        let mut cmd = redis::cmd("ZPOPMAX");
        cmd.arg(key);
        // 返回[member, score]扁平数组，空集合时为空数组
        let reply = self.run::<Vec<String>>(&cmd)?;
        if reply.len() < 2 {
            return None;
        }
        let score = reply[1].parse().unwrap_or(0.0);
        Some((reply[0].clone(), score))
    }

    fn zcard(&self, key: &str) -> i64 {
        let mut cmd = redis::cmd("ZCARD");
        cmd.arg(key);
        self.run::<i64>(&cmd).unwrap_or(0)
    }

    fn incr(&self, key: &str) -> i64 {
        let mut cmd = redis::cmd("INCR");
        cmd.arg(key);
        self.run::<i64>(&cmd).unwrap_or(0)
    }

    fn decr(&self, key: &str) -> i64 {
        let mut cmd = redis::cmd("DECR");
        cmd.arg(key);
        self.run::<i64>(&cmd).unwrap_or(0)
    }
}
