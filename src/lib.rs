//! nexus-im 消息路由核心 / nexus-im message routing core
//!
//! 接收客户端的结构化消息，为每个接收者在三条投递路径中选择一条：
//! 本地连接直投、跨节点总线转发、离线队列暂存。
//! Accepts structured client messages and, per recipient, picks one of three
//! delivery paths: local connection, cross-node bus relay, offline queue.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod registry;
pub mod relay;
pub mod server;
pub mod service;
pub mod storage;
pub mod tasks;
pub mod ws;
