//! 走法定义
//!
//! 线上格式为 4-5 个字符：起点 + 终点 + 可选的升变字母。
//! 第 5 个字符为 `x` 时表示不升变；编码时从不输出这个占位符。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::NO_PROMOTION_SENTINEL;
use crate::error::ProtocolError;
use crate::piece::{Promotion, Square};

/// 一步走法（坐标记法）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UciMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Promotion>,
}

impl UciMove {
    pub fn new(from: Square, to: Square, promotion: Option<Promotion>) -> Self {
        Self { from, to, promotion }
    }
}

impl fmt::Display for UciMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)?;
        if let Some(promotion) = self.promotion {
            write!(f, "{}", promotion.to_char())?;
        }
        Ok(())
    }
}

impl FromStr for UciMove {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::InvalidMove { raw: s.to_string() };
        if !s.is_ascii() || !(4..=5).contains(&s.len()) {
            return Err(invalid());
        }

        let from: Square = s[0..2].parse().map_err(|_| invalid())?;
        let to: Square = s[2..4].parse().map_err(|_| invalid())?;
        let promotion = match s[4..].chars().next() {
            None => None,
            Some(c) if c.eq_ignore_ascii_case(&NO_PROMOTION_SENTINEL) => None,
            Some(c) => Some(Promotion::from_char(c).ok_or_else(invalid)?),
        };

        Ok(Self { from, to, promotion })
    }
}

impl TryFrom<String> for UciMove {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UciMove> for String {
    fn from(mv: UciMove) -> String {
        mv.to_string()
    }
}
