//! 控制器：每帧调度、跨线程指令队列、统计

mod context;
mod instruction;
mod profiler;
mod task;

pub use context::SimContext;
pub use instruction::{Action, ControllerInstruction, InstructionQueue};
pub use profiler::{FrameStats, Profiler, ProfilerStats};
pub use task::ControllerTask;
