// ==========================================
// 诊所管理系统 - 数据质量校验器实现
// ==========================================
// 职责: 最低识别信号 / 警告 / 格式错误 / 待补字段清单
// 红线: 校验结论只做记录，从不阻断落库，也从不抛错
// ==========================================

use crate::domain::import::ValidationOutcome;
use crate::domain::patient::CanonicalRow;
use crate::domain::types::{PendingField, Sex};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::patient_importer_trait::{
    DataCleaner as DataCleanerTrait, RowValidator as RowValidatorTrait,
};
use crate::importer::tax_id::{is_valid_tax_id, TAX_ID_LEN};
use chrono::{Datelike, NaiveDate};

/// 可用电话的最少位数（区号 + 号码）
pub const MIN_PHONE_DIGITS: usize = 10;

pub const DEFAULT_MINOR_AGE_THRESHOLD: u32 = 18;

/// 单次运行内不变的校验上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext {
    pub today: NaiveDate,          // 计算年龄的基准日期
    pub minor_age_threshold: u32,  // 未成年判定年龄
}

impl ValidationContext {
    pub fn new(today: NaiveDate, minor_age_threshold: u32) -> Self {
        Self {
            today,
            minor_age_threshold,
        }
    }
}

pub struct DqValidator {
    cleaner: DataCleaner,
}

impl DqValidator {
    pub fn new() -> Self {
        Self {
            cleaner: DataCleaner,
        }
    }

    fn digits(&self, value: Option<&str>) -> String {
        value.map(|v| self.cleaner.digits_only(v)).unwrap_or_default()
    }

    fn has_text(value: Option<&str>) -> bool {
        value.is_some_and(|v| !v.trim().is_empty())
    }

    /// 任一电话列达到最少位数
    fn has_usable_phone(&self, row: &CanonicalRow) -> bool {
        self.digits(row.phone.as_deref()).len() >= MIN_PHONE_DIGITS
            || self.digits(row.phone_secondary.as_deref()).len() >= MIN_PHONE_DIGITS
    }

    /// 地址最小完整度: 街道 + 城市 + 邮编，或 城市 + 州
    fn has_minimal_address(row: &CanonicalRow) -> bool {
        let street = Self::has_text(row.street.as_deref());
        let city = Self::has_text(row.city.as_deref());
        let postal = Self::has_text(row.postal_code.as_deref());
        let state = Self::has_text(row.state.as_deref());
        (street && city && postal) || (city && state)
    }

    /// 解析出生日期（未来日期视为无效，两位年份按世纪回退）
    pub fn parse_birth_date(&self, raw: Option<&str>, today: NaiveDate) -> Option<NaiveDate> {
        raw.and_then(|text| self.cleaner.parse_birth_date(text, today))
    }
}

impl Default for DqValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// 周岁年龄
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

impl RowValidatorTrait for DqValidator {
    fn has_minimum_signal(&self, row: &CanonicalRow) -> bool {
        Self::has_text(row.full_name.as_deref())
            || Self::has_text(row.social_name.as_deref())
            || self.digits(row.tax_id.as_deref()).len() == TAX_ID_LEN
            || self.has_usable_phone(row)
    }

    fn validate(&self, row: &CanonicalRow, ctx: &ValidationContext) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let today = ctx.today;

        let has_name = Self::has_text(row.full_name.as_deref());
        let sex = row.sex.as_deref().and_then(Sex::parse);
        let birth_raw = row.birth_date.as_deref().filter(|v| !v.trim().is_empty());
        let birth_date = self.parse_birth_date(birth_raw, today);
        let tax_digits = self.digits(row.tax_id.as_deref());
        let tax_id_valid = is_valid_tax_id(&tax_digits);

        // === 警告 ===
        if !has_name && !Self::has_text(row.social_name.as_deref()) {
            outcome.warnings.push("Nome não informado".to_string());
        }
        if !Self::has_text(row.sex.as_deref()) {
            outcome.warnings.push("Sexo não informado".to_string());
        }
        if birth_raw.is_none() {
            outcome
                .warnings
                .push("Data de nascimento não informada".to_string());
        }

        // === 格式错误（仅记录）===
        if !tax_digits.is_empty() && !tax_id_valid {
            outcome.real_errors.push(format!(
                "CPF inválido: {}",
                row.tax_id.as_deref().unwrap_or_default()
            ));
        }
        if let Some(raw) = birth_raw {
            if birth_date.is_none() {
                outcome
                    .real_errors
                    .push(format!("Data de nascimento inválida: {}", raw.trim()));
            }
        }

        // === 待补字段 ===
        let mut pending = Vec::new();
        if !has_name {
            pending.push(PendingField::FullName);
        }
        if !tax_id_valid && !Self::has_text(row.id_document.as_deref()) {
            pending.push(PendingField::TaxIdOrDocument);
        }
        if sex.is_none() {
            pending.push(PendingField::Sex);
        }
        if birth_date.is_none() {
            pending.push(PendingField::BirthDate);
        }
        if self.cleaner.clean_email(row.email.as_deref()).is_none() {
            pending.push(PendingField::Email);
        }
        if !self.has_usable_phone(row) {
            pending.push(PendingField::Phone);
        }
        if !Self::has_minimal_address(row) {
            pending.push(PendingField::Address);
        }
        if !Self::has_text(row.record_number.as_deref()) {
            pending.push(PendingField::RecordNumber);
        }

        // 未成年: 追加监护人字段（监护人 CPF 始终待核验）
        if let Some(birth) = birth_date {
            if age_on(birth, today) < ctx.minor_age_threshold as i32 {
                if !Self::has_text(row.responsible_name.as_deref()) {
                    pending.push(PendingField::ResponsibleName);
                }
                pending.push(PendingField::ResponsibleTaxId);
            }
        }

        outcome.pending_critical_fields = pending
            .iter()
            .copied()
            .filter(PendingField::is_critical)
            .collect();
        outcome.pending_fields = pending;

        outcome
    }
}
