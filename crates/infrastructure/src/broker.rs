/// Broker客户端抽象
///
/// 生产者、worker与去重/优先级层都只依赖这个trait。生产实现为
/// [`crate::RedisBroker`]，内存实现为[`crate::MemoryBroker`]，两者可见语义
/// 一致（相同的absent/present结果与可见顺序）。
///
/// 失败模型：任何无法完成的操作（传输错误、超时）返回保守默认值
/// （absent/0/false），不panic也不返回错误。调用方把这种结果当作可重试
/// 失败处理；客户端自身不做重试。`ping()`是健康探针，上层借此区分
/// "队列空"与"broker不可达"。
pub trait BrokerClient: Send + Sync {
    /// 连通性探测，返回broker是否存活
    fn ping(&self) -> bool;

    /// 写入键值；ttl_seconds为0表示永不过期
    fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> bool;

    /// 读取键值，键不存在返回None
    fn get(&self, key: &str) -> Option<String>;

    /// 删除单个键，返回删除数量
    fn del(&self, key: &str) -> i64;

    /// 批量删除，返回删除数量
    fn del_many(&self, keys: &[String]) -> i64;

    fn exists(&self, key: &str) -> bool;

    /// 设置过期时间
    fn expire(&self, key: &str, seconds: i64) -> bool;

    /// 剩余存活秒数；-1表示永不过期，-2表示键不存在
    fn ttl(&self, key: &str) -> i64;

    /// 左推入list，返回推入后的list长度
    fn lpush(&self, key: &str, value: &str) -> i64;

    /// 右弹出list
    fn rpop(&self, key: &str) -> Option<String>;

    /// 阻塞右弹出；timeout_seconds为0表示无限等待
    fn brpop(&self, key: &str, timeout_seconds: u64) -> Option<String>;

    fn llen(&self, key: &str) -> i64;

    /// 闭区间范围读取，负索引从尾部倒数
    fn lrange(&self, key: &str, start: i64, stop: i64) -> Vec<String>;

    /// 集合加入成员；返回新增数量（已存在返回0）
    fn sadd(&self, key: &str, member: &str) -> i64;

    fn sismember(&self, key: &str, member: &str) -> bool;

    /// 集合移除成员；幂等，重复调用返回0
    fn srem(&self, key: &str, member: &str) -> i64;

    fn scard(&self, key: &str) -> i64;

    /// 有序集合插入或更新成员分数
    fn zadd(&self, key: &str, score: f64, member: &str) -> bool;

    /// 弹出分数最高的成员，返回(member, score)
    fn zpopmax(&self, key: &str) -> Option<(String, f64)>;

    fn zcard(&self, key: &str) -> i64;

    /// 原子自增；键不存在时从0创建
    fn incr(&self, key: &str) -> i64;

    /// 原子自减；键不存在时从0创建
    fn decr(&self, key: &str) -> i64;
}
