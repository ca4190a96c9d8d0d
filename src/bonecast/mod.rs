//! BoneCast：从蒙皮网格派生碰撞网格
//!
//! 流程：缓存命中（参数一致）→ 参数变化时用缓存的原始几何重建 →
//! 磁盘读取 → 向宿主提取几何并构建 → 写回磁盘。
//! 缓存锁只在查找 / 插入时持有，提取、构建、磁盘读写都在锁外。

mod builder;
mod cache;
mod geometry;
mod io;
mod quadric;

pub use builder::{build_collider_data, BuildParams};
pub use cache::{BoneCastCache, CacheEntry, CacheKey};
pub use geometry::{extract_geometry, ColliderData, ColliderDataStorage};
pub use io::BoneCastIo;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{GlobalConfig, NodeConfig};
use crate::host::{ActorHandle, GeometryProvider};
use crate::Result;

/// 网格构建标识：单调递增计数 + 时间戳
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct UpdateId {
    pub id: u64,
    pub timestamp: u64,
}

/// 查询结果
#[derive(Clone, Debug)]
pub struct BoneResult {
    pub data: Arc<ColliderData>,
    pub update_id: UpdateId,
}

/// BoneCast 服务（内部同步，可在多线程共享）
pub struct BoneCastService {
    cache: Mutex<BoneCastCache>,
    io: Option<BoneCastIo>,
    /// 任何条目变化都会递增，碰撞体据此判断是否需要重新查询
    generation: AtomicU64,
    extractions: AtomicU64,
}

impl BoneCastService {
    pub fn new(max_size: usize, cache_dir: Option<PathBuf>) -> Self {
        Self {
            cache: Mutex::new(BoneCastCache::new(max_size)),
            io: cache_dir.map(BoneCastIo::new),
            generation: AtomicU64::new(0),
            extractions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(config.bonecast_cache_max_size, config.bonecast_cache_dir.clone())
    }

    /// 查询节点的碰撞网格
    ///
    /// persistent_id 为 None 时不走磁盘。
    pub fn get<G: GeometryProvider + ?Sized>(
        &self,
        geometry: &G,
        actor: ActorHandle,
        persistent_id: Option<&str>,
        node: &str,
        conf: &NodeConfig,
    ) -> Result<BoneResult> {
        let params = BuildParams::from_node(conf);

        let cached_storage = {
            let mut cache = self.cache.lock();
            match cache.get(actor, node) {
                Some(entry) if entry.data.params == params => return Ok(entry.result()),
                Some(entry) => Some(Arc::clone(&entry.storage)),
                None => None,
            }
        };

        if let Some(storage) = cached_storage {
            log::debug!("[BoneCast] {}:{} 参数变化，重新构建", actor, node);
            let data = Arc::new(build_collider_data(node, &storage, &params)?);
            self.persist(persistent_id, node, &storage, &data);
            return Ok(self.insert(actor, node, storage, data));
        }

        if let (Some(io), Some(pid)) = (&self.io, persistent_id) {
            if let Some((storage, data)) = io.read(pid, node, &params) {
                log::debug!("[BoneCast] {}:{} 从磁盘读取", actor, node);
                return Ok(self.insert(actor, node, Arc::new(storage), Arc::new(data)));
            }
        }

        self.extract_and_build(geometry, actor, persistent_id, node, conf)
    }

    /// 强制重新提取（不读磁盘），用于几何变化后
    pub fn update<G: GeometryProvider + ?Sized>(
        &self,
        geometry: &G,
        actor: ActorHandle,
        persistent_id: Option<&str>,
        node: &str,
        conf: &NodeConfig,
    ) -> Result<BoneResult> {
        self.extract_and_build(geometry, actor, persistent_id, node, conf)
    }

    fn extract_and_build<G: GeometryProvider + ?Sized>(
        &self,
        geometry: &G,
        actor: ActorHandle,
        persistent_id: Option<&str>,
        node: &str,
        conf: &NodeConfig,
    ) -> Result<BoneResult> {
        let params = BuildParams::from_node(conf);
        self.extractions.fetch_add(1, Ordering::Relaxed);
        let storage = Arc::new(extract_geometry(geometry, actor, node, &conf.bc_shape)?);
        let data = Arc::new(build_collider_data(node, &storage, &params)?);
        self.persist(persistent_id, node, &storage, &data);
        Ok(self.insert(actor, node, storage, data))
    }

    fn persist(&self, persistent_id: Option<&str>, node: &str, storage: &ColliderDataStorage, data: &ColliderData) {
        if let (Some(io), Some(pid)) = (&self.io, persistent_id) {
            io.write(pid, node, storage, data);
        }
    }

    fn insert(
        &self,
        actor: ActorHandle,
        node: &str,
        storage: Arc<ColliderDataStorage>,
        data: Arc<ColliderData>,
    ) -> BoneResult {
        let result = self.cache.lock().add(actor, node, storage, data);
        self.generation.fetch_add(1, Ordering::Release);
        result
    }

    /// 丢弃单个条目（拓扑或几何变化、节点移除）
    ///
    /// 给出 persistent_id 时同时删除磁盘条目，下次查询一定重新提取。
    pub fn invalidate(&self, actor: ActorHandle, persistent_id: Option<&str>, node: &str) -> bool {
        let removed = self.cache.lock().remove(actor, node);
        if removed {
            self.generation.fetch_add(1, Ordering::Release);
        }
        if let (Some(io), Some(pid)) = (&self.io, persistent_id) {
            if io.remove(pid, node) {
                log::debug!("[BoneCast] 删除磁盘条目 {}:{}", pid, node);
            }
        }
        removed
    }

    /// 丢弃角色的全部内存条目（角色移除 / 卸载）
    ///
    /// 句柄会被复用，内存条目不能留给下一个角色；磁盘条目按持久 ID 保存，保留。
    pub fn invalidate_actor(&self, actor: ActorHandle) -> usize {
        let removed = self.cache.lock().remove_actor(actor);
        if removed > 0 {
            self.generation.fetch_add(1, Ordering::Release);
        }
        removed
    }

    /// 当前缓存中该节点的 update-id
    pub fn current_update_id(&self, actor: ActorHandle, node: &str) -> Option<UpdateId> {
        self.cache.lock().get(actor, node).map(|e| e.update_id)
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn cache_size(&self) -> usize {
        self.cache.lock().size()
    }

    pub fn max_size(&self) -> usize {
        self.cache.lock().max_size()
    }

    /// 调整字节上限，立即淘汰超出部分
    pub fn set_max_size(&self, max_size: usize) {
        let mut cache = self.cache.lock();
        if cache.max_size() != max_size {
            log::debug!("[BoneCast] 缓存上限 {} -> {}", cache.max_size(), max_size);
            cache.set_max_size(max_size);
        }
    }

    /// 向宿主提取几何的累计次数
    pub fn extraction_count(&self) -> u64 {
        self.extractions.load(Ordering::Relaxed)
    }

    pub fn last_io_error(&self) -> Option<String> {
        self.io.as_ref().and_then(BoneCastIo::last_error)
    }

    pub fn release(&self) {
        self.cache.lock().release();
        self.generation.fetch_add(1, Ordering::Release);
    }
}
