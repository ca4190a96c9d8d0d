//! 模拟：单骨骼积分器与每角色组件表

mod component;
mod object;

pub use component::{Impulse, SimComponent};
pub use object::{plan_actor, SimObject};

use crate::config::{NodeConfig, PhysicsConfig};

/// 一个节点的已解析配置
///
/// 配置存储解析后的快照；组件只持有快照，不回引存储。
#[derive(Clone, Debug, PartialEq)]
pub struct NodePlan {
    pub node: String,
    pub group: String,
    pub group_id: u64,
    pub physics: PhysicsConfig,
    pub node_conf: NodeConfig,
}
