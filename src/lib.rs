//! 骨骼次级运动（"抖动"）物理运行时
//!
//! 为角色骨骼挂接弹簧-阻尼节点与碰撞体，随宿主动画循环逐帧模拟。
//!
//! 模块划分：
//! - host: 宿主接口（骨骼变换、蒙皮几何）
//! - config: 全局 / 物理 / 节点配置与配置存储
//! - bonecast: 从蒙皮网格派生碰撞网格，带缓存与磁盘持久化
//! - collision: 碰撞形状、碰撞体生命周期、接触求解
//! - sim: 单骨骼弹簧积分器与每角色组件表
//! - controller: 每帧调度、指令队列、统计

pub mod bonecast;
pub mod collision;
pub mod config;
pub mod controller;
pub mod host;
pub mod sim;

mod error;

pub use error::{JiggleError, Result};

pub use bonecast::{BoneCastService, BoneResult, UpdateId};
pub use collision::{Collider, CollisionShape};
pub use config::{ConfigStore, GlobalConfig, NodeConfig, PhysicsConfig, ShapeKind};
pub use controller::{Action, ControllerInstruction, ControllerTask, InstructionQueue, SimContext};
pub use host::{ActorHandle, GeometryProvider, NodeTransform, SceneHost, SkeletonProvider};
pub use sim::{SimComponent, SimObject};
