//! 配置存储
//!
//! 作用域分层：全局 → 种族 → 角色，护甲覆盖叠加在最上层。
//! 解析结果全部经过 sanitized()，交给组件的配置不再做校验。

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;

use crate::host::{ActorHandle, ActorInfo};
use crate::{JiggleError, Result};

use super::{GlobalConfig, NodeConfig, PhysicsConfig};

/// 节点名 → 配置组
pub type NodeMap = BTreeMap<String, String>;

/// 组名 → 物理配置
pub type PhysicsConfigs = HashMap<String, PhysicsConfig>;

/// 节点名 → 节点配置
pub type NodeConfigs = HashMap<String, NodeConfig>;

/// 没有节点映射文件时的默认映射
static DEFAULT_NODE_MAP: Lazy<NodeMap> = Lazy::new(|| {
    [
        ("NPC L Breast", "Breast"),
        ("NPC R Breast", "Breast"),
        ("NPC L Butt", "Butt"),
        ("NPC R Butt", "Butt"),
        ("HDT Belly", "Belly"),
    ]
    .into_iter()
    .map(|(n, g)| (n.to_string(), g.to_string()))
    .collect()
});

/// 配置存储
#[derive(Debug, Clone)]
pub struct ConfigStore {
    global: GlobalConfig,

    node_map: NodeMap,
    /// 组 → 节点列表
    config_groups: BTreeMap<String, Vec<String>>,
    /// 组 → 稳定数字 ID（从 1 开始，0 表示无组）
    group_ids: HashMap<String, u64>,
    next_group_id: u64,

    physics_global: PhysicsConfigs,
    physics_race: HashMap<u32, PhysicsConfigs>,
    physics_actor: HashMap<ActorHandle, PhysicsConfigs>,

    nodes_global: NodeConfigs,
    nodes_race: HashMap<u32, NodeConfigs>,
    nodes_actor: HashMap<ActorHandle, NodeConfigs>,

    armor_overrides: HashMap<ActorHandle, PhysicsConfigs>,

    last_error: Option<String>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::with_node_map(DEFAULT_NODE_MAP.clone())
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用自定义节点映射初始化
    pub fn with_node_map(node_map: NodeMap) -> Self {
        let mut store = Self {
            global: GlobalConfig::default(),
            node_map: NodeMap::new(),
            config_groups: BTreeMap::new(),
            group_ids: HashMap::new(),
            next_group_id: 1,
            physics_global: HashMap::new(),
            physics_race: HashMap::new(),
            physics_actor: HashMap::new(),
            nodes_global: HashMap::new(),
            nodes_race: HashMap::new(),
            nodes_actor: HashMap::new(),
            armor_overrides: HashMap::new(),
            last_error: None,
        };
        for (node, group) in node_map {
            store.insert_node(node, group);
        }
        store
    }

    fn insert_node(&mut self, node: String, group: String) {
        self.config_groups.entry(group.clone()).or_default().push(node.clone());
        if !self.group_ids.contains_key(&group) {
            self.group_ids.insert(group.clone(), self.next_group_id);
            self.next_group_id += 1;
        }
        self.physics_global.entry(group.clone()).or_default();
        self.nodes_global.entry(node.clone()).or_default();
        self.node_map.insert(node, group);
    }

    fn record_error(&mut self, e: JiggleError) -> JiggleError {
        log::warn!("[Config] {}", e);
        self.last_error = Some(e.to_string());
        e
    }

    // ========================================
    // 全局
    // ========================================

    #[inline]
    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn set_global(&mut self, global: GlobalConfig) {
        self.global = global.sanitized();
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // ========================================
    // 节点映射
    // ========================================

    pub fn node_map(&self) -> &NodeMap {
        &self.node_map
    }

    pub fn config_group(&self, node: &str) -> Option<&str> {
        self.node_map.get(node).map(String::as_str)
    }

    pub fn nodes_in_group(&self, group: &str) -> &[String] {
        self.config_groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 组的数字 ID，未知组返回 0
    pub fn group_id(&self, group: &str) -> u64 {
        self.group_ids.get(group).copied().unwrap_or(0)
    }

    pub fn add_node(&mut self, node: &str, group: &str) -> Result<()> {
        if self.node_map.contains_key(node) {
            return Err(self.record_error(JiggleError::DuplicateNode(node.to_string())));
        }
        self.insert_node(node.to_string(), group.to_string());
        Ok(())
    }

    /// 移除节点；组内最后一个节点移除后组的配置一并清除
    pub fn remove_node(&mut self, node: &str) -> Result<()> {
        let Some(group) = self.node_map.remove(node) else {
            return Err(self.record_error(JiggleError::NodeNotFound(node.to_string())));
        };

        self.nodes_global.remove(node);
        for confs in self.nodes_race.values_mut().chain(self.nodes_actor.values_mut()) {
            confs.remove(node);
        }

        let emptied = match self.config_groups.get_mut(&group) {
            Some(nodes) => {
                nodes.retain(|n| n != node);
                nodes.is_empty()
            }
            None => false,
        };
        if emptied {
            self.config_groups.remove(&group);
            self.group_ids.remove(&group);
            self.physics_global.remove(&group);
            for confs in self
                .physics_race
                .values_mut()
                .chain(self.physics_actor.values_mut())
                .chain(self.armor_overrides.values_mut())
            {
                confs.remove(&group);
            }
        }
        Ok(())
    }

    // ========================================
    // 写入各作用域
    // ========================================

    fn check_group(&mut self, group: &str) -> Result<()> {
        if self.config_groups.contains_key(group) {
            Ok(())
        } else {
            Err(self.record_error(JiggleError::ConfigGroupNotFound(group.to_string())))
        }
    }

    fn check_node(&mut self, node: &str) -> Result<()> {
        if self.node_map.contains_key(node) {
            Ok(())
        } else {
            Err(self.record_error(JiggleError::NodeNotFound(node.to_string())))
        }
    }

    pub fn set_global_physics(&mut self, group: &str, conf: PhysicsConfig) -> Result<()> {
        self.check_group(group)?;
        self.physics_global.insert(group.to_string(), conf);
        Ok(())
    }

    pub fn set_race_physics(&mut self, race: u32, group: &str, conf: PhysicsConfig) -> Result<()> {
        self.check_group(group)?;
        self.physics_race.entry(race).or_default().insert(group.to_string(), conf);
        Ok(())
    }

    pub fn set_actor_physics(&mut self, actor: ActorHandle, group: &str, conf: PhysicsConfig) -> Result<()> {
        self.check_group(group)?;
        self.physics_actor.entry(actor).or_default().insert(group.to_string(), conf);
        Ok(())
    }

    pub fn set_global_node(&mut self, node: &str, conf: NodeConfig) -> Result<()> {
        self.check_node(node)?;
        self.nodes_global.insert(node.to_string(), conf);
        Ok(())
    }

    pub fn set_race_node(&mut self, race: u32, node: &str, conf: NodeConfig) -> Result<()> {
        self.check_node(node)?;
        self.nodes_race.entry(race).or_default().insert(node.to_string(), conf);
        Ok(())
    }

    pub fn set_actor_node(&mut self, actor: ActorHandle, node: &str, conf: NodeConfig) -> Result<()> {
        self.check_node(node)?;
        self.nodes_actor.entry(actor).or_default().insert(node.to_string(), conf);
        Ok(())
    }

    pub fn set_armor_override(&mut self, actor: ActorHandle, group: &str, conf: PhysicsConfig) -> Result<()> {
        self.check_group(group)?;
        self.armor_overrides.entry(actor).or_default().insert(group.to_string(), conf);
        Ok(())
    }

    pub fn clear_armor_override(&mut self, actor: ActorHandle) {
        self.armor_overrides.remove(&actor);
    }

    pub fn clear_armor_overrides(&mut self) {
        self.armor_overrides.clear();
    }

    pub fn has_armor_override(&self, actor: ActorHandle) -> bool {
        self.armor_overrides.get(&actor).is_some_and(|o| !o.is_empty())
    }

    // ========================================
    // 解析
    // ========================================

    /// 解析角色的全部物理组配置
    pub fn resolve_physics(&self, actor: ActorHandle, info: Option<&ActorInfo>) -> PhysicsConfigs {
        let race = info.and_then(|i| i.race);
        let actor_layer = self.physics_actor.get(&actor);
        let race_layer = race.and_then(|r| self.physics_race.get(&r));
        let armor_layer = self.armor_overrides.get(&actor);

        self.config_groups
            .keys()
            .map(|group| {
                let conf = armor_layer
                    .and_then(|l| l.get(group))
                    .or_else(|| actor_layer.and_then(|l| l.get(group)))
                    .or_else(|| race_layer.and_then(|l| l.get(group)))
                    .or_else(|| self.physics_global.get(group))
                    .cloned()
                    .unwrap_or_default();
                (group.clone(), conf.sanitized())
            })
            .collect()
    }

    /// 解析角色的全部节点配置
    pub fn resolve_nodes(&self, actor: ActorHandle, info: Option<&ActorInfo>) -> NodeConfigs {
        let race = info.and_then(|i| i.race);
        let actor_layer = self.nodes_actor.get(&actor);
        let race_layer = race.and_then(|r| self.nodes_race.get(&r));

        self.node_map
            .keys()
            .map(|node| {
                let conf = actor_layer
                    .and_then(|l| l.get(node))
                    .or_else(|| race_layer.and_then(|l| l.get(node)))
                    .or_else(|| self.nodes_global.get(node))
                    .cloned()
                    .unwrap_or_default();
                (node.clone(), conf.sanitized())
            })
            .collect()
    }
}
