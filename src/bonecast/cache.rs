//! BoneCast 缓存
//!
//! (角色, 节点) → 构建好的碰撞网格，总字节数有上限。
//! 超限时按最久未访问逐个淘汰（线性扫描，条目数很少）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::host::ActorHandle;

use super::geometry::{ColliderData, ColliderDataStorage};
use super::{BoneResult, UpdateId};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub actor: ActorHandle,
    pub node: String,
}

impl CacheKey {
    pub fn new(actor: ActorHandle, node: &str) -> Self {
        Self { actor, node: node.to_string() }
    }
}

#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// 原始几何，参数变化时据此重建
    pub storage: Arc<ColliderDataStorage>,
    pub data: Arc<ColliderData>,
    pub size: usize,
    /// 逻辑访问时钟
    pub last_access: u64,
    pub update_id: UpdateId,
}

impl CacheEntry {
    pub fn result(&self) -> BoneResult {
        BoneResult { data: Arc::clone(&self.data), update_id: self.update_id }
    }
}

pub struct BoneCastCache {
    entries: HashMap<CacheKey, CacheEntry>,
    max_size: usize,
    total_size: usize,
    clock: u64,
    next_id: u64,
    epoch: Instant,
}

impl BoneCastCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
            total_size: 0,
            clock: 0,
            next_id: 0,
            epoch: Instant::now(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn next_update_id(&mut self) -> UpdateId {
        self.next_id += 1;
        UpdateId {
            id: self.next_id,
            timestamp: self.epoch.elapsed().as_nanos() as u64,
        }
    }

    /// 查找并刷新访问时间
    pub fn get(&mut self, actor: ActorHandle, node: &str) -> Option<&CacheEntry> {
        let now = self.tick();
        let entry = self.entries.get_mut(&CacheKey::new(actor, node))?;
        entry.last_access = now;
        Some(entry)
    }

    /// 插入（替换同键条目），分配新的 update-id 后执行淘汰
    ///
    /// 单个条目超过上限时会被立即淘汰，返回的结果仍然有效。
    pub fn add(
        &mut self,
        actor: ActorHandle,
        node: &str,
        storage: Arc<ColliderDataStorage>,
        data: Arc<ColliderData>,
    ) -> BoneResult {
        let size = storage.byte_size() + data.byte_size() + node.len() + std::mem::size_of::<CacheEntry>();
        let entry = CacheEntry {
            storage,
            data,
            size,
            last_access: self.tick(),
            update_id: self.next_update_id(),
        };
        let result = entry.result();

        if let Some(old) = self.entries.insert(CacheKey::new(actor, node), entry) {
            self.total_size -= old.size;
        }
        self.total_size += size;
        self.evict_overflow();
        result
    }

    pub fn remove(&mut self, actor: ActorHandle, node: &str) -> bool {
        match self.entries.remove(&CacheKey::new(actor, node)) {
            Some(e) => {
                self.total_size -= e.size;
                true
            }
            None => false,
        }
    }

    /// 移除角色的全部条目，返回移除数
    pub fn remove_actor(&mut self, actor: ActorHandle) -> usize {
        let before = self.entries.len();
        let mut freed = 0;
        self.entries.retain(|k, e| {
            let keep = k.actor != actor;
            if !keep {
                freed += e.size;
            }
            keep
        });
        self.total_size -= freed;
        before - self.entries.len()
    }

    pub fn evict_overflow(&mut self) {
        while self.total_size > self.max_size {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            if let Some(e) = self.entries.remove(&oldest) {
                self.total_size -= e.size;
                log::debug!("[BoneCast] 淘汰 {}:{} ({} 字节)", oldest.actor, oldest.node, e.size);
            }
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.total_size
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_overflow();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, actor: ActorHandle, node: &str) -> bool {
        self.entries.contains_key(&CacheKey::new(actor, node))
    }

    pub fn release(&mut self) {
        self.entries = HashMap::new();
        self.total_size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bonecast::builder::BuildParams;
    use glam::Vec3;

    fn payload(tris: usize) -> (Arc<ColliderDataStorage>, Arc<ColliderData>) {
        let vertices = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let indices: Vec<u32> = std::iter::repeat([0, 1, 2]).take(tris).flatten().collect();
        let storage = ColliderDataStorage {
            vertices: vertices.clone(),
            indices: indices.clone(),
            weights: vec![1.0; 3],
        };
        let data = ColliderData::new(vertices, indices, BuildParams::default());
        (Arc::new(storage), Arc::new(data))
    }

    #[test]
    fn test_update_id_increases() {
        let mut cache = BoneCastCache::new(usize::MAX);
        let (s, d) = payload(1);
        let a = cache.add(ActorHandle(1), "A", s.clone(), d.clone());
        let b = cache.add(ActorHandle(1), "A", s, d);
        assert!(b.update_id.id > a.update_id.id);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(ActorHandle(1), "A").unwrap().update_id, b.update_id);
    }

    #[test]
    fn test_eviction_keeps_size_under_max() {
        let (s, d) = payload(100);
        let one = {
            let mut sizing = BoneCastCache::new(usize::MAX);
            sizing.add(ActorHandle(0), "N0", s.clone(), d.clone());
            sizing.size()
        };

        let mut cache = BoneCastCache::new(one * 3 + one / 2);
        for i in 0..10 {
            cache.add(ActorHandle(0), &format!("N{}", i), s.clone(), d.clone());
            assert!(cache.size() <= cache.max_size());
        }
        assert_eq!(cache.len(), 3);
        // 最近插入的保留
        assert!(cache.contains(ActorHandle(0), "N9"));
        assert!(!cache.contains(ActorHandle(0), "N0"));
    }

    #[test]
    fn test_eviction_prefers_least_recently_accessed() {
        let (s, d) = payload(10);
        let mut sizing = BoneCastCache::new(usize::MAX);
        sizing.add(ActorHandle(0), "A", s.clone(), d.clone());
        let one = sizing.size();

        let mut cache = BoneCastCache::new(one * 2);
        cache.add(ActorHandle(0), "A", s.clone(), d.clone());
        cache.add(ActorHandle(0), "B", s.clone(), d.clone());
        assert!(cache.get(ActorHandle(0), "A").is_some());
        cache.add(ActorHandle(0), "C", s, d);

        assert!(cache.contains(ActorHandle(0), "A"));
        assert!(!cache.contains(ActorHandle(0), "B"));
        assert!(cache.contains(ActorHandle(0), "C"));
    }

    #[test]
    fn test_remove_actor() {
        let (s, d) = payload(1);
        let mut cache = BoneCastCache::new(usize::MAX);
        cache.add(ActorHandle(1), "A", s.clone(), d.clone());
        cache.add(ActorHandle(1), "B", s.clone(), d.clone());
        cache.add(ActorHandle(2), "A", s, d);
        assert_eq!(cache.remove_actor(ActorHandle(1)), 2);
        assert_eq!(cache.len(), 1);
        cache.release();
        assert_eq!(cache.size(), 0);
    }
}
