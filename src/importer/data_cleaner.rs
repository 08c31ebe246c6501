// ==========================================
// 诊所管理系统 - 数据清洗器实现
// ==========================================
// 职责: TRIM / NULL 标准化 / 去重音 / 数字提取 / 巴西日期格式解析
// 说明: 全部为纯函数，不访问外部状态
// ==========================================

use crate::importer::patient_importer_trait::DataCleaner as DataCleanerTrait;
use chrono::{Datelike, Duration, NaiveDate};

/// 电子表格序列日期的纪元（1899-12-30 + n 天）
const SPREADSHEET_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// 文本中的序列日期: 整数部分必须恰为 5 位（10000 = 1927-05-18，99999 = 2173-10-14）
/// 更短的纯数字（"1985"、"12"）不是日期
const SERIAL_TEXT_DIGITS: usize = 5;

/// 数值单元格的序列日期区间（1900-01-01 .. 9999-12-31）
const SERIAL_MIN: f64 = 1.0;
const SERIAL_MAX: f64 = 2_958_465.0;

const FULL_YEAR_FORMATS: [&str; 5] = ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d"];
const SHORT_YEAR_FORMATS: [&str; 3] = ["%d/%m/%y", "%d-%m-%y", "%d.%m.%y"];

pub struct DataCleaner;

impl DataCleanerTrait for DataCleaner {
    fn clean_text(&self, value: &str, uppercase: bool) -> String {
        let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
        if uppercase {
            collapsed.to_uppercase()
        } else {
            collapsed
        }
    }

    fn normalize_null(&self, value: Option<String>) -> Option<String> {
        value.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn digits_only(&self, value: &str) -> String {
        value.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    fn fold_diacritics(&self, value: &str) -> String {
        value.chars().map(fold_char).collect()
    }

    fn parse_date(&self, value: &str) -> Option<NaiveDate> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }

        // 去掉时间部分（"1990-05-01 00:00:00" / "1990-05-01T00:00:00"）
        let date_part = trimmed
            .split(|c: char| c == ' ' || c == 'T')
            .next()
            .unwrap_or(trimmed);

        // chrono 的 %Y 接受任意位数年份，两位年份需先走 %y
        if has_short_year(date_part) {
            for format in SHORT_YEAR_FORMATS {
                if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
                    return Some(date);
                }
            }
        }

        for format in FULL_YEAR_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
                if date.year() >= 1000 {
                    return Some(date);
                }
            }
        }

        if date_part.len() == 8 && date_part.chars().all(|c| c.is_ascii_digit()) {
            return parse_compact_date(date_part);
        }

        parse_serial_text(date_part)
    }
}

impl DataCleaner {
    /// 解析出生日期
    ///
    /// 两位年份落在未来时回退一个世纪（"01/01/50" → 1950），仍在未来则视为无效
    pub fn parse_birth_date(&self, value: &str, today: NaiveDate) -> Option<NaiveDate> {
        let date = self.parse_date(value)?;
        if date <= today {
            return Some(date);
        }
        let date_part = value.trim().split([' ', 'T']).next().unwrap_or_default();
        if has_short_year(date_part) {
            return date.with_year(date.year() - 100).filter(|d| *d <= today);
        }
        None
    }

    /// 标准化 UF（两位大写字母；其余保留原文）
    pub fn clean_state(&self, value: Option<String>) -> Option<String> {
        self.normalize_null(value).map(|v| {
            if v.chars().count() == 2 {
                v.to_uppercase()
            } else {
                self.clean_text(&v, false)
            }
        })
    }

    /// 拆分标签（分号或逗号分隔，去重保序）
    pub fn split_tags(&self, value: Option<&str>) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for part in value.unwrap_or_default().split([';', ',']) {
            let tag = self.clean_text(part, false);
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }

    /// 标准化邮箱（小写，必须含 '@'）
    pub fn clean_email(&self, value: Option<&str>) -> Option<String> {
        value
            .map(|v| v.trim().to_lowercase())
            .filter(|v| v.contains('@') && !v.starts_with('@') && !v.ends_with('@'))
    }
}

fn has_short_year(value: &str) -> bool {
    let parts: Vec<&str> = value.split(['/', '-', '.']).collect();
    parts.len() == 3 && parts[2].len() == 2 && parts[0].len() <= 2
}

/// 8 位纯数字日期：优先 yyyymmdd（年份落在 1900..=2100），否则 ddmmyyyy
fn parse_compact_date(value: &str) -> Option<NaiveDate> {
    let year_prefix: i32 = value[..4].parse().ok()?;
    if (1900..=2100).contains(&year_prefix) {
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y%m%d") {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(value, "%d%m%Y").ok()
}

fn parse_serial_text(value: &str) -> Option<NaiveDate> {
    let normalized = value.replace(',', ".");
    let integer_part = normalized.split('.').next().unwrap_or_default();
    if integer_part.len() != SERIAL_TEXT_DIGITS || !integer_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    serial_to_date(normalized.parse().ok()?)
}

/// 电子表格序列值 → 日期（Excel 数值/日期单元格）
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(SERIAL_MIN..=SERIAL_MAX).contains(&serial) {
        return None;
    }
    let (y, m, d) = SPREADSHEET_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// 单字符去重音（覆盖葡语/西语常见字符与序数符号）
fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' | 'ª' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'º' | '°' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}
