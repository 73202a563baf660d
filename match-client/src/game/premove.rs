//! 预走队列
//!
//! 最多保留一步，新的预走直接替换旧的。

use protocol::{Promotion, Square, UciMove};

/// 预走的一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Premove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Promotion>,
}

impl Premove {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, promotion: Promotion) -> Self {
        self.promotion = Some(promotion);
        self
    }

    /// 提交时的走法
    pub fn to_move(self) -> UciMove {
        UciMove {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PremoveQueue {
    pending: Option<Premove>,
}

impl PremoveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置预走，返回被替换的旧预走
    pub fn set(&mut self, premove: Premove) -> Option<Premove> {
        self.pending.replace(premove)
    }

    pub fn clear(&mut self) -> Option<Premove> {
        self.pending.take()
    }

    /// 轮到本方时取出
    pub fn take(&mut self) -> Option<Premove> {
        self.pending.take()
    }

    pub fn peek(&self) -> Option<&Premove> {
        self.pending.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }
}
