// 连接层入口 / Connection layer entry
pub mod connection;
pub mod server;
