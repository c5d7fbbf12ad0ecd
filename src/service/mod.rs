// 服务模块入口 / Service module entry
pub mod delivery;
pub mod friend;
pub mod group;
pub mod session;
