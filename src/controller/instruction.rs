//! 控制器指令与队列
//!
//! 其它线程（UI、脚本、事件回调）只通过队列请求修改，
//! 帧线程在 Phase 1 开头一次性取出。

use std::collections::VecDeque;

use glam::Vec3;
use parking_lot::Mutex;

use crate::host::ActorHandle;

/// 指令动作
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    AddActor,
    RemoveActor,
    UpdateConfig,
    /// 角色未在模拟中时改为添加
    UpdateConfigOrAdd,
    UpdateConfigAll,
    /// 释放全部角色后按当前配置重建
    Reset,
    /// 只清零运动状态
    PhysicsReset,
    /// 骨骼层级变化，重建角色
    NiNodeUpdate,
    NiNodeUpdateAll,
    WeightUpdate,
    WeightUpdateAll,
    UpdateArmorOverride,
    UpdateArmorOverridesAll,
    ClearArmorOverrides,
    ValidateNodes,
    RemoveInvalidNodes,
    ClearActors,
    ApplyForce { steps: u32, component: String, force: Vec3 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ControllerInstruction {
    pub action: Action,
    /// 针对全部角色的动作忽略此字段
    pub handle: ActorHandle,
}

impl ControllerInstruction {
    pub fn new(action: Action, handle: ActorHandle) -> Self {
        Self { action, handle }
    }

    /// 不针对具体角色的指令
    pub fn global(action: Action) -> Self {
        Self { action, handle: ActorHandle::default() }
    }
}

/// FIFO 指令队列
#[derive(Debug, Default)]
pub struct InstructionQueue {
    inner: Mutex<VecDeque<ControllerInstruction>>,
}

impl InstructionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, instruction: ControllerInstruction) {
        self.inner.lock().push_back(instruction);
    }

    pub fn push_action(&self, action: Action, handle: ActorHandle) {
        self.push(ControllerInstruction::new(action, handle));
    }

    /// 取出全部指令，锁只在交换期间持有
    pub fn drain(&self) -> Vec<ControllerInstruction> {
        let drained = std::mem::take(&mut *self.inner.lock());
        drained.into()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_drain_keeps_order() {
        let queue = InstructionQueue::new();
        queue.push_action(Action::AddActor, ActorHandle(1));
        queue.push_action(Action::Reset, ActorHandle(2));
        queue.push(ControllerInstruction::global(Action::ClearActors));

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].action, Action::AddActor);
        assert_eq!(drained[2].action, Action::ClearActors);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_from_other_threads() {
        let queue = Arc::new(InstructionQueue::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let q = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        q.push_action(Action::WeightUpdate, ActorHandle(i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(queue.drain().len(), 100);
    }
}
