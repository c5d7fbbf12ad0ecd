// 后台任务入口 / Background task entry
pub mod heartbeat;
