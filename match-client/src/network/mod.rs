//! 网络通信模块
//!
//! 连接生命周期、入站消息分发、重连与发送重试

mod channel;
mod router;

#[cfg(test)]
pub(crate) mod mock;

pub use channel::*;
pub use router::*;
