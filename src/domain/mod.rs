// 领域模型入口 / Domain model entry
pub mod message;
