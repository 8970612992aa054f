//! 两阶段检索任务链
//!
//! 提交时写入一条 PENDING 任务和第一阶段消息；worker 执行第一阶段，成功后在同一事务中
//! 写入第二阶段消息，失败则直接将任务置为 FAILURE；第二阶段完成后写入结果。

mod orchestrator;
pub mod queue;
mod stages;
pub mod store;
mod worker;

pub use orchestrator::*;
pub use stages::*;
pub use worker::*;
