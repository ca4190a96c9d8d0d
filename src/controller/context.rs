//! 共享上下文

use std::sync::Arc;

use parking_lot::RwLock;

use crate::bonecast::BoneCastService;
use crate::config::ConfigStore;

use super::InstructionQueue;

/// 控制器与外部线程共享的状态
///
/// 配置存储读多写少；BoneCast 服务内部同步；指令队列是唯一的跨线程修改入口。
#[derive(Clone)]
pub struct SimContext {
    pub config: Arc<RwLock<ConfigStore>>,
    pub bonecast: Arc<BoneCastService>,
    pub queue: Arc<InstructionQueue>,
}

impl SimContext {
    pub fn new(config: ConfigStore) -> Self {
        let bonecast = BoneCastService::from_config(config.global());
        Self {
            config: Arc::new(RwLock::new(config)),
            bonecast: Arc::new(bonecast),
            queue: Arc::new(InstructionQueue::new()),
        }
    }
}

impl Default for SimContext {
    fn default() -> Self {
        Self::new(ConfigStore::new())
    }
}
