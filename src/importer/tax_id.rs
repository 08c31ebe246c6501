// ==========================================
// 诊所管理系统 - CPF 校验与占位生成
// ==========================================
// 职责: CPF 双校验位算法 / 占位 CPF 生成
// 红线: 所有位相同的序列一律无效
// ==========================================

use chrono::Utc;

pub const TAX_ID_LEN: usize = 11;

/// 校验 CPF（先去除所有非数字字符）
///
/// # 规则
/// - 必须恰好 11 位数字
/// - 全部相同数字无效
/// - 第 1 校验位: 前 9 位加权（10..2），余数 < 2 取 0，否则 11 - 余数
/// - 第 2 校验位: 前 10 位加权（11..2），同上
pub fn is_valid_tax_id(value: &str) -> bool {
    let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != TAX_ID_LEN {
        return false;
    }
    if digits.iter().all(|d| *d == digits[0]) {
        return false;
    }

    check_digit(&digits[..9]) == digits[9] && check_digit(&digits[..10]) == digits[10]
}

/// 计算一位校验位（权重从 len+1 递减到 2）
fn check_digit(digits: &[u32]) -> u32 {
    let weight_start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, d)| d * (weight_start - i as u32))
        .sum();
    let remainder = sum % 11;
    if remainder < 2 {
        0
    } else {
        11 - remainder
    }
}

// ==========================================
// PlaceholderTaxIds - 占位 CPF 生成器
// ==========================================
// 格式: 秒级时间戳后 6 位 + 5 位运行内序号（共 11 位）
// 不变量: 同一生成器产出的值互不重复（序号单调递增）
#[derive(Debug, Clone)]
pub struct PlaceholderTaxIds {
    prefix: u64,
    sequence: u64,
}

const SEQUENCE_SPAN: u64 = 100_000;
const PREFIX_SPAN: u64 = 1_000_000;

impl PlaceholderTaxIds {
    pub fn new() -> Self {
        let seconds = Utc::now().timestamp().unsigned_abs();
        Self::with_prefix(seconds % PREFIX_SPAN)
    }

    pub fn with_prefix(prefix: u64) -> Self {
        Self {
            prefix: prefix % PREFIX_SPAN,
            sequence: 0,
        }
    }

    /// 生成下一个占位值；序号用尽时前缀进位
    pub fn next_tax_id(&mut self) -> String {
        self.sequence += 1;
        if self.sequence >= SEQUENCE_SPAN {
            self.sequence = 1;
            self.prefix = (self.prefix + 1) % PREFIX_SPAN;
        }
        format!("{:06}{:05}", self.prefix, self.sequence)
    }
}

impl Default for PlaceholderTaxIds {
    fn default() -> Self {
        Self::new()
    }
}
