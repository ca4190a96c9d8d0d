//! 配置
//!
//! - GlobalConfig: 子步、缓存上限、调试开关
//! - PhysicsConfig / NodeConfig: 按组 / 按节点的物理参数
//! - ConfigStore: 作用域分层与节点映射

mod global;
mod physics;
mod store;

pub use global::GlobalConfig;
pub use physics::{rotation_from_degrees, ColliderParams, MotionConstraints, NodeConfig, PhysicsConfig, ShapeKind};
pub use store::{ConfigStore, NodeConfigs, NodeMap, PhysicsConfigs};
