//! 每帧调度
//!
//! Phase 1：取指令、剔除失效角色与组件、读取变换
//! Phase 2：定步长子步积分 + 接触
//! Phase 3：写回局部变换、统计

use std::collections::BTreeMap;
use std::time::Instant;

use glam::Vec3;
use rayon::prelude::*;

use crate::collision::{resolve_contacts, ContactBody};
use crate::config::{GlobalConfig, PhysicsConfig};
use crate::host::{ActorHandle, ActorInfo, SceneHost};
use crate::sim::{plan_actor, NodePlan, SimObject};
use crate::{JiggleError, Result};

use super::{Action, ControllerInstruction, FrameStats, Profiler, SimContext};

pub struct ControllerTask {
    ctx: SimContext,
    actors: BTreeMap<ActorHandle, SimObject>,
    /// 未满一个子步的剩余时间
    accumulator: f32,
    marked_actor: Option<ActorHandle>,
    profiler: Profiler,

    // 接触求解的复用缓冲
    bodies: Vec<ContactBody>,
    owners: Vec<(ActorHandle, usize)>,
}

impl ControllerTask {
    pub fn new(ctx: SimContext) -> Self {
        let interval = ctx.config.read().global().stats_interval;
        Self {
            ctx,
            actors: BTreeMap::new(),
            accumulator: 0.0,
            marked_actor: None,
            profiler: Profiler::new(interval),
            bodies: Vec::new(),
            owners: Vec::new(),
        }
    }

    // ========================================
    // 查询
    // ========================================

    #[inline]
    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn actors(&self) -> impl Iterator<Item = ActorHandle> + '_ {
        self.actors.keys().copied()
    }

    pub fn actor(&self, handle: ActorHandle) -> Option<&SimObject> {
        self.actors.get(&handle)
    }

    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// 组件当前使用的配置快照
    pub fn component_config(&self, handle: ActorHandle, node: &str) -> Option<&PhysicsConfig> {
        self.actors.get(&handle)?.component(node).map(|c| c.config())
    }

    #[inline]
    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    #[inline]
    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    #[inline]
    pub fn marked_actor(&self) -> Option<ActorHandle> {
        self.marked_actor
    }

    pub fn set_marked_actor(&mut self, handle: Option<ActorHandle>) {
        self.marked_actor = handle;
    }

    /// 对角色的组件（节点名或配置组名）施加冲量
    pub fn apply_force(&mut self, handle: ActorHandle, steps: u32, component: &str, force: Vec3) -> Result<usize> {
        self.actors
            .get_mut(&handle)
            .ok_or(JiggleError::UnknownActor(handle))?
            .apply_force(component, steps, force)
    }

    // ========================================
    // 帧
    // ========================================

    /// 运行一帧，elapsed 为距上一帧的秒数
    pub fn run_frame(&mut self, host: &mut dyn SceneHost, elapsed: f32) {
        let start = Instant::now();
        let global = self.ctx.config.read().global().clone();
        self.profiler.set_interval(global.stats_interval);
        self.ctx.bonecast.set_max_size(global.bonecast_cache_max_size);

        // ====== Phase 1 ======
        for instruction in self.ctx.queue.drain() {
            if global.debug_log {
                log::debug!("[Controller] {:?} {}", instruction.action, instruction.handle);
            }
            if let Err(e) = self.apply_instruction(host, instruction, &global) {
                self.record_error(&e);
            }
        }
        self.cull_actors(host);
        self.remove_invalid_components();

        let frame_dt = if elapsed.is_finite() && elapsed > 0.0 { elapsed } else { 0.0 };
        for object in self.actors.values_mut() {
            object.refresh_bone_casts(&*host, &self.ctx.bonecast);
            object.read_transforms(&*host, frame_dt);
        }

        // ====== Phase 2 ======
        let (steps, dropped) = self.substeps(frame_dt, &global);
        if dropped > 0 {
            log::debug!("[Controller] 帧时间过长，丢弃 {} 个子步", dropped);
        }
        let mut contacts = 0;
        for _ in 0..steps {
            self.integrate(global.time_tick, global.parallel);
            if global.collisions {
                contacts += self.resolve_collisions(global.time_tick);
            }
        }

        // ====== Phase 3 ======
        for object in self.actors.values() {
            object.write_transforms(&mut *host);
        }

        let frame = FrameStats {
            frame_time: start.elapsed(),
            substeps: steps,
            dropped_steps: dropped,
            actors: self.actors.len(),
            components: self.actors.values().map(SimObject::len).sum(),
            contacts,
        };
        if self.profiler.record(frame) && global.controller_stats {
            let s = self.profiler.stats();
            log::info!(
                "[Controller] 帧耗时 {:?}, 子步 {:.2}, 角色 {:.1}, 组件 {:.1}, 接触 {:.1}, 丢弃子步 {}",
                s.avg_frame_time,
                s.avg_substeps,
                s.avg_actors,
                s.avg_components,
                s.avg_contacts,
                s.dropped_steps
            );
        }
    }

    /// 累加器切分子步，超出上限的整步丢弃，不足一步的部分留到下一帧
    fn substeps(&mut self, elapsed: f32, global: &GlobalConfig) -> (u32, u32) {
        let tick = global.time_tick;
        self.accumulator += elapsed;
        let due = (self.accumulator / tick).floor() as u32;
        self.accumulator -= due as f32 * tick;
        if self.accumulator < 0.0 {
            self.accumulator = 0.0;
        }
        let run = due.min(global.max_substeps);
        (run, due - run)
    }

    fn integrate(&mut self, dt: f32, parallel: bool) {
        if parallel {
            self.actors.par_iter_mut().for_each(|(_, object)| object.update_motion(dt));
        } else {
            for object in self.actors.values_mut() {
                object.update_motion(dt);
            }
        }
    }

    fn resolve_collisions(&mut self, dt: f32) -> usize {
        self.bodies.clear();
        self.owners.clear();
        for (&handle, object) in &self.actors {
            for (index, body) in object.contact_bodies() {
                self.bodies.push(body);
                self.owners.push((handle, index));
            }
        }
        if self.bodies.len() < 2 {
            return 0;
        }

        let contacts = resolve_contacts(&mut self.bodies, dt);
        for (body, &(handle, index)) in self.bodies.iter().zip(&self.owners) {
            if let Some(object) = self.actors.get_mut(&handle) {
                object.set_contact_velocity(index, body.velocity);
            }
        }
        contacts
    }

    /// 移除宿主已卸载的角色；句柄可能被复用，内存中的网格条目一并丢弃
    fn cull_actors(&mut self, host: &dyn SceneHost) {
        let loaded = host.loaded_actors();
        let bonecast = &self.ctx.bonecast;
        self.actors.retain(|handle, _| {
            let keep = loaded.contains(handle);
            if !keep {
                log::debug!("[Controller] 角色 {} 已卸载", handle);
                bonecast.invalidate_actor(*handle);
            }
            keep
        });
        if self.marked_actor.is_some_and(|m| !self.actors.contains_key(&m)) {
            self.marked_actor = None;
        }
    }

    fn remove_invalid_components(&mut self) {
        let bonecast = &self.ctx.bonecast;
        self.actors.retain(|handle, object| {
            object.remove_invalid_nodes(bonecast);
            if object.is_empty() {
                bonecast.invalidate_actor(*handle);
            }
            if object.is_empty() {
                log::debug!("[Controller] 角色 {} 没有剩余组件，移除", handle);
            }
            !object.is_empty()
        });
    }

    // ========================================
    // 指令
    // ========================================

    fn record_error(&mut self, e: &JiggleError) {
        log::warn!("[Controller] 指令失败: {}", e);
        self.profiler.set_last_error(e.to_string());
    }

    /// 逐个角色执行；单个角色失败只记录，其余角色照常处理
    fn for_each_actor<F>(&mut self, handles: Vec<ActorHandle>, mut f: F)
    where
        F: FnMut(&mut Self, ActorHandle) -> Result<()>,
    {
        for handle in handles {
            if let Err(e) = f(self, handle) {
                self.record_error(&e);
            }
        }
    }

    fn handles(&self) -> Vec<ActorHandle> {
        self.actors.keys().copied().collect()
    }

    fn apply_instruction(
        &mut self,
        host: &mut dyn SceneHost,
        instruction: ControllerInstruction,
        global: &GlobalConfig,
    ) -> Result<()> {
        let handle = instruction.handle;
        match instruction.action {
            Action::AddActor => self.add_actor(host, handle, global),
            Action::RemoveActor => {
                self.remove_actor(host, handle);
                Ok(())
            }
            Action::UpdateConfig | Action::UpdateArmorOverride => self.update_actor_config(host, handle, global),
            Action::UpdateConfigOrAdd => {
                if self.actors.contains_key(&handle) {
                    self.update_actor_config(host, handle, global)
                } else {
                    self.add_actor(host, handle, global)
                }
            }
            Action::UpdateConfigAll | Action::UpdateArmorOverridesAll => {
                self.update_all_configs(host, global);
                Ok(())
            }
            Action::ClearArmorOverrides => {
                self.ctx.config.write().clear_armor_overrides();
                self.update_all_configs(host, global);
                Ok(())
            }
            Action::Reset => {
                let handles = self.handles();
                self.clear_actors(host);
                self.for_each_actor(handles, |task, h| task.add_actor(&mut *host, h, global));
                self.accumulator = 0.0;
                Ok(())
            }
            Action::PhysicsReset => {
                for object in self.actors.values_mut() {
                    object.reset();
                }
                Ok(())
            }
            Action::NiNodeUpdate => self.rebuild_actor(host, handle, global),
            Action::NiNodeUpdateAll => {
                let handles = self.handles();
                self.for_each_actor(handles, |task, h| task.rebuild_actor(&mut *host, h, global));
                Ok(())
            }
            Action::WeightUpdate => self.update_weight(host, handle),
            Action::WeightUpdateAll => {
                let handles = self.handles();
                self.for_each_actor(handles, |task, h| task.update_weight(&*host, h));
                Ok(())
            }
            Action::ValidateNodes => {
                for object in self.actors.values_mut() {
                    object.validate_nodes(&*host);
                }
                Ok(())
            }
            Action::RemoveInvalidNodes => {
                self.remove_invalid_components();
                Ok(())
            }
            Action::ClearActors => {
                self.clear_actors(host);
                Ok(())
            }
            Action::ApplyForce { steps, component, force } => {
                self.apply_force(handle, steps, &component, force).map(|_| ())
            }
        }
    }

    fn add_actor(&mut self, host: &mut dyn SceneHost, handle: ActorHandle, global: &GlobalConfig) -> Result<()> {
        if self.actors.contains_key(&handle) {
            return Ok(());
        }
        if !host.loaded_actors().contains(&handle) {
            return Err(JiggleError::UnknownActor(handle));
        }
        let info = host.actor_info(handle).ok_or(JiggleError::UnknownActor(handle))?;
        let plans = plan_actor(&self.ctx.config.read(), handle, Some(&info));
        if plans.is_empty() {
            log::debug!("[Controller] 角色 {} 没有启用的节点", handle);
            return Ok(());
        }

        let object = SimObject::build(handle, &info, &plans, &*host, &self.ctx.bonecast, global);
        if object.is_empty() {
            log::debug!("[Controller] 角色 {} 的骨架中没有配置的节点", handle);
            return Ok(());
        }
        log::debug!("[Controller] 添加角色 {} '{}'", handle, info.name);
        self.actors.insert(handle, object);
        Ok(())
    }

    /// 用新计划重建已有角色
    ///
    /// 调用前所有可能失败的查询都已完成，这里只替换，不会丢失旧对象。
    fn replace_actor(
        &mut self,
        host: &mut dyn SceneHost,
        handle: ActorHandle,
        info: &ActorInfo,
        plans: &[NodePlan],
        global: &GlobalConfig,
    ) {
        // 先写回旧对象的初始局部变换，新对象才能读到静止姿态
        if let Some(old) = self.actors.get(&handle) {
            old.release(&mut *host);
        }
        let object = SimObject::build(handle, info, plans, &*host, &self.ctx.bonecast, global);
        if object.is_empty() {
            log::debug!("[Controller] 角色 {} 重建后没有组件，移除", handle);
            self.actors.remove(&handle);
            if self.marked_actor == Some(handle) {
                self.marked_actor = None;
            }
            return;
        }
        self.actors.insert(handle, object);
    }

    fn remove_actor(&mut self, host: &mut dyn SceneHost, handle: ActorHandle) {
        if let Some(object) = self.actors.remove(&handle) {
            object.release(host);
            self.ctx.bonecast.invalidate_actor(handle);
            if self.marked_actor == Some(handle) {
                self.marked_actor = None;
            }
        }
    }

    fn clear_actors(&mut self, host: &mut dyn SceneHost) {
        for object in self.actors.values() {
            object.release(&mut *host);
        }
        self.actors.clear();
        self.marked_actor = None;
    }

    /// 整体应用新配置；节点集合变化时重建角色
    fn update_actor_config(&mut self, host: &mut dyn SceneHost, handle: ActorHandle, global: &GlobalConfig) -> Result<()> {
        let info = host.actor_info(handle).ok_or(JiggleError::UnknownActor(handle))?;
        let plans = plan_actor(&self.ctx.config.read(), handle, Some(&info));

        let object = self.actors.get_mut(&handle).ok_or(JiggleError::UnknownActor(handle))?;
        object.set_gravity_dir(global.gravity_dir);
        if object.update_config(&plans) {
            object.refresh_bone_casts(&*host, &self.ctx.bonecast);
            return Ok(());
        }

        log::debug!("[Controller] 角色 {} 节点集合变化，重建", handle);
        self.replace_actor(host, handle, &info, &plans, global);
        Ok(())
    }

    fn update_all_configs(&mut self, host: &mut dyn SceneHost, global: &GlobalConfig) {
        let handles = self.handles();
        self.for_each_actor(handles, |task, h| task.update_actor_config(&mut *host, h, global));
    }

    /// 骨骼层级或几何变化：丢弃网格缓存（含磁盘）后重建
    fn rebuild_actor(&mut self, host: &mut dyn SceneHost, handle: ActorHandle, global: &GlobalConfig) -> Result<()> {
        let object = self.actors.get(&handle).ok_or(JiggleError::UnknownActor(handle))?;
        let info = host.actor_info(handle).ok_or(JiggleError::UnknownActor(handle))?;
        let plans = plan_actor(&self.ctx.config.read(), handle, Some(&info));

        object.invalidate_bone_casts(&self.ctx.bonecast);
        self.ctx.bonecast.invalidate_actor(handle);
        self.replace_actor(host, handle, &info, &plans, global);
        Ok(())
    }

    fn update_weight(&mut self, host: &dyn SceneHost, handle: ActorHandle) -> Result<()> {
        let info = host.actor_info(handle).ok_or(JiggleError::UnknownActor(handle))?;
        let object = self.actors.get_mut(&handle).ok_or(JiggleError::UnknownActor(handle))?;
        object.set_weight(info.weight);
        Ok(())
    }
}
