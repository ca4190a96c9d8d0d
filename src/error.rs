//! 错误类型

use thiserror::Error;

use crate::host::ActorHandle;

/// 引擎错误
#[derive(Debug, Error)]
pub enum JiggleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 磁盘缓存文件损坏或版本不符
    #[error("Corrupt bone-cast cache entry: {0}")]
    CorruptCache(String),

    #[error("No skinned geometry for node '{node}'")]
    NoGeometry { node: String },

    #[error("Malformed geometry: {0}")]
    MalformedGeometry(String),

    /// 权重过滤 / 简化后没有剩余三角形
    #[error("Bone-cast mesh for node '{node}' has no triangles left")]
    EmptyMesh { node: String },

    #[error("Shape {0:?} requires a bone-cast payload")]
    MissingBoneCast(crate::config::ShapeKind),

    #[error("Failed to build collision shape: {0}")]
    ShapeBuild(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Node already belongs to a group: {0}")]
    DuplicateNode(String),

    #[error("Config group not found: {0}")]
    ConfigGroupNotFound(String),

    #[error("Actor {0} is not simulated")]
    UnknownActor(ActorHandle),

    #[error("Actor {actor} has no component '{component}'")]
    UnknownComponent { actor: ActorHandle, component: String },
}

pub type Result<T> = std::result::Result<T, JiggleError>;
