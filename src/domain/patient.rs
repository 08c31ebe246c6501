// ==========================================
// 诊所管理系统 - 患者领域模型
// ==========================================
// 职责: 标准字段词表 / 标准行 / 落库载荷 / 更新补丁
// 红线: 标准行只承载固定词表字段，未识别列进入 extra，不静默丢弃
// ==========================================

use crate::domain::types::{PendingField, Sex};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// CanonicalField - 标准字段词表
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    FullName,
    SocialName,
    TaxId,
    IdDocument,
    Sex,
    BirthDate,
    Email,
    Phone,
    PhoneSecondary,
    Street,
    StreetNumber,
    Complement,
    Neighborhood,
    City,
    State,
    PostalCode,
    RecordNumber,
    PreferredProvider,
    InsuranceName,
    InsuranceCardNumber,
    InsurancePlan,
    MotherName,
    FatherName,
    ResponsibleName,
    ResponsibleTaxId,
    Education,
    Occupation,
    MaritalStatus,
    Nationality,
    BirthPlace,
    Tags,
    Notes,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 32] = [
        CanonicalField::FullName,
        CanonicalField::SocialName,
        CanonicalField::TaxId,
        CanonicalField::IdDocument,
        CanonicalField::Sex,
        CanonicalField::BirthDate,
        CanonicalField::Email,
        CanonicalField::Phone,
        CanonicalField::PhoneSecondary,
        CanonicalField::Street,
        CanonicalField::StreetNumber,
        CanonicalField::Complement,
        CanonicalField::Neighborhood,
        CanonicalField::City,
        CanonicalField::State,
        CanonicalField::PostalCode,
        CanonicalField::RecordNumber,
        CanonicalField::PreferredProvider,
        CanonicalField::InsuranceName,
        CanonicalField::InsuranceCardNumber,
        CanonicalField::InsurancePlan,
        CanonicalField::MotherName,
        CanonicalField::FatherName,
        CanonicalField::ResponsibleName,
        CanonicalField::ResponsibleTaxId,
        CanonicalField::Education,
        CanonicalField::Occupation,
        CanonicalField::MaritalStatus,
        CanonicalField::Nationality,
        CanonicalField::BirthPlace,
        CanonicalField::Tags,
        CanonicalField::Notes,
    ];

    /// 标准字段键（JSON 信封 fields 与报告使用）
    pub fn key(&self) -> &'static str {
        match self {
            CanonicalField::FullName => "full_name",
            CanonicalField::SocialName => "social_name",
            CanonicalField::TaxId => "tax_id",
            CanonicalField::IdDocument => "id_document",
            CanonicalField::Sex => "sex",
            CanonicalField::BirthDate => "birth_date",
            CanonicalField::Email => "email",
            CanonicalField::Phone => "phone",
            CanonicalField::PhoneSecondary => "phone_secondary",
            CanonicalField::Street => "street",
            CanonicalField::StreetNumber => "street_number",
            CanonicalField::Complement => "complement",
            CanonicalField::Neighborhood => "neighborhood",
            CanonicalField::City => "city",
            CanonicalField::State => "state",
            CanonicalField::PostalCode => "postal_code",
            CanonicalField::RecordNumber => "record_number",
            CanonicalField::PreferredProvider => "preferred_provider",
            CanonicalField::InsuranceName => "insurance_name",
            CanonicalField::InsuranceCardNumber => "insurance_card_number",
            CanonicalField::InsurancePlan => "insurance_plan",
            CanonicalField::MotherName => "mother_name",
            CanonicalField::FatherName => "father_name",
            CanonicalField::ResponsibleName => "responsible_name",
            CanonicalField::ResponsibleTaxId => "responsible_tax_id",
            CanonicalField::Education => "education",
            CanonicalField::Occupation => "occupation",
            CanonicalField::MaritalStatus => "marital_status",
            CanonicalField::Nationality => "nationality",
            CanonicalField::BirthPlace => "birth_place",
            CanonicalField::Tags => "tags",
            CanonicalField::Notes => "notes",
        }
    }

    pub fn from_key(key: &str) -> Option<CanonicalField> {
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }
}

// ==========================================
// FieldKey - 表头映射目标
// ==========================================
// 未命中别名表的表头以 slug 形式保留为临时键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldKey {
    Canonical(CanonicalField),
    Extra(String),
}

impl FieldKey {
    pub fn as_str(&self) -> &str {
        match self {
            FieldKey::Canonical(field) => field.key(),
            FieldKey::Extra(slug) => slug,
        }
    }
}

// ==========================================
// CanonicalRow - 标准行
// ==========================================
// 不变量: 每个标准字段至多一个值；多列映射到同一字段时首个非空值胜出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub full_name: Option<String>,
    pub social_name: Option<String>,
    pub tax_id: Option<String>,
    pub id_document: Option<String>,
    pub sex: Option<String>,
    pub birth_date: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub phone_secondary: Option<String>,
    pub street: Option<String>,
    pub street_number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub record_number: Option<String>,
    pub preferred_provider: Option<String>,
    pub insurance_name: Option<String>,
    pub insurance_card_number: Option<String>,
    pub insurance_plan: Option<String>,
    pub mother_name: Option<String>,
    pub father_name: Option<String>,
    pub responsible_name: Option<String>,
    pub responsible_tax_id: Option<String>,
    pub education: Option<String>,
    pub occupation: Option<String>,
    pub marital_status: Option<String>,
    pub nationality: Option<String>,
    pub birth_place: Option<String>,
    pub tags: Option<String>,
    pub notes: Option<String>,

    /// 未识别列（slug → 值）
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl CanonicalRow {
    fn slot_mut(&mut self, field: CanonicalField) -> &mut Option<String> {
        match field {
            CanonicalField::FullName => &mut self.full_name,
            CanonicalField::SocialName => &mut self.social_name,
            CanonicalField::TaxId => &mut self.tax_id,
            CanonicalField::IdDocument => &mut self.id_document,
            CanonicalField::Sex => &mut self.sex,
            CanonicalField::BirthDate => &mut self.birth_date,
            CanonicalField::Email => &mut self.email,
            CanonicalField::Phone => &mut self.phone,
            CanonicalField::PhoneSecondary => &mut self.phone_secondary,
            CanonicalField::Street => &mut self.street,
            CanonicalField::StreetNumber => &mut self.street_number,
            CanonicalField::Complement => &mut self.complement,
            CanonicalField::Neighborhood => &mut self.neighborhood,
            CanonicalField::City => &mut self.city,
            CanonicalField::State => &mut self.state,
            CanonicalField::PostalCode => &mut self.postal_code,
            CanonicalField::RecordNumber => &mut self.record_number,
            CanonicalField::PreferredProvider => &mut self.preferred_provider,
            CanonicalField::InsuranceName => &mut self.insurance_name,
            CanonicalField::InsuranceCardNumber => &mut self.insurance_card_number,
            CanonicalField::InsurancePlan => &mut self.insurance_plan,
            CanonicalField::MotherName => &mut self.mother_name,
            CanonicalField::FatherName => &mut self.father_name,
            CanonicalField::ResponsibleName => &mut self.responsible_name,
            CanonicalField::ResponsibleTaxId => &mut self.responsible_tax_id,
            CanonicalField::Education => &mut self.education,
            CanonicalField::Occupation => &mut self.occupation,
            CanonicalField::MaritalStatus => &mut self.marital_status,
            CanonicalField::Nationality => &mut self.nationality,
            CanonicalField::BirthPlace => &mut self.birth_place,
            CanonicalField::Tags => &mut self.tags,
            CanonicalField::Notes => &mut self.notes,
        }
    }

    /// 读取标准字段
    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        let value = match field {
            CanonicalField::FullName => &self.full_name,
            CanonicalField::SocialName => &self.social_name,
            CanonicalField::TaxId => &self.tax_id,
            CanonicalField::IdDocument => &self.id_document,
            CanonicalField::Sex => &self.sex,
            CanonicalField::BirthDate => &self.birth_date,
            CanonicalField::Email => &self.email,
            CanonicalField::Phone => &self.phone,
            CanonicalField::PhoneSecondary => &self.phone_secondary,
            CanonicalField::Street => &self.street,
            CanonicalField::StreetNumber => &self.street_number,
            CanonicalField::Complement => &self.complement,
            CanonicalField::Neighborhood => &self.neighborhood,
            CanonicalField::City => &self.city,
            CanonicalField::State => &self.state,
            CanonicalField::PostalCode => &self.postal_code,
            CanonicalField::RecordNumber => &self.record_number,
            CanonicalField::PreferredProvider => &self.preferred_provider,
            CanonicalField::InsuranceName => &self.insurance_name,
            CanonicalField::InsuranceCardNumber => &self.insurance_card_number,
            CanonicalField::InsurancePlan => &self.insurance_plan,
            CanonicalField::MotherName => &self.mother_name,
            CanonicalField::FatherName => &self.father_name,
            CanonicalField::ResponsibleName => &self.responsible_name,
            CanonicalField::ResponsibleTaxId => &self.responsible_tax_id,
            CanonicalField::Education => &self.education,
            CanonicalField::Occupation => &self.occupation,
            CanonicalField::MaritalStatus => &self.marital_status,
            CanonicalField::Nationality => &self.nationality,
            CanonicalField::BirthPlace => &self.birth_place,
            CanonicalField::Tags => &self.tags,
            CanonicalField::Notes => &self.notes,
        };
        value.as_deref()
    }

    /// 写入字段（首个非空值胜出）
    ///
    /// # 返回
    /// - true: 本次写入生效
    /// - false: 值为空或字段已有值
    pub fn set_if_empty(&mut self, key: &FieldKey, value: &str) -> bool {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return false;
        }

        match key {
            FieldKey::Canonical(field) => {
                let slot = self.slot_mut(*field);
                if slot.is_some() {
                    return false;
                }
                *slot = Some(trimmed.to_string());
                true
            }
            FieldKey::Extra(slug) => {
                if self.extra.contains_key(slug) {
                    return false;
                }
                self.extra.insert(slug.clone(), trimmed.to_string());
                true
            }
        }
    }

    /// 展示名（缺失时回退为 "Linha N"）
    pub fn display_name(&self, line: usize) -> String {
        self.full_name
            .clone()
            .or_else(|| self.social_name.clone())
            .unwrap_or_else(|| format!("Linha {}", line))
    }
}

// ==========================================
// PatientPayload - 落库载荷
// ==========================================
// 对齐: 记录存储的文档结构（分组保存）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileGroup {
    pub full_name: Option<String>,
    pub social_name: Option<String>,
    pub sex: Option<Sex>,
    pub marital_status: Option<String>,
    pub occupation: Option<String>,
    pub nationality: Option<String>,
    pub mother_name: Option<String>,
    pub father_name: Option<String>,
    pub responsible_name: Option<String>,
    pub responsible_tax_id: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentsGroup {
    pub tax_id: Option<String>,         // 仅数字；创建时必填（缺失则占位）
    pub tax_id_is_placeholder: bool,    // 占位 CPF 标记
    pub id_document: Option<String>,    // RG 等替代证件
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BirthGroup {
    pub birth_date: Option<NaiveDate>,
    pub birth_date_raw: Option<String>,
    pub birth_place: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationGroup {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordGroup {
    pub record_number: Option<String>,
    pub preferred_provider: Option<String>,
    pub pending_fields: Vec<PendingField>,
    pub source: Option<String>,
    pub imported_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phone {
    pub number: String, // 仅数字
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insurance {
    pub name: Option<String>,
    pub card_number: Option<String>,
    pub plan: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientPayload {
    pub profile: ProfileGroup,
    pub documents: DocumentsGroup,
    pub birth: BirthGroup,
    pub education: EducationGroup,
    pub record: RecordGroup,
    pub phone: Option<Phone>,
    pub address: Option<Address>,
    pub insurance: Option<Insurance>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PatientPayload {
    /// 唯一键（CPF 数字串）
    pub fn tax_id(&self) -> Option<&str> {
        self.documents.tax_id.as_deref()
    }

    /// 应用更新补丁
    ///
    /// # 规则
    /// - Replace: 补丁中存在的字段组整体覆盖；识别键（CPF、档案号）缺失时沿用原值
    /// - Merge: 字段级合并，补丁非空值覆盖，空值保留原值；标签取并集
    pub fn apply_update(&mut self, update: &PatientUpdate) {
        match update.mode {
            UpdateMode::Replace => {
                replace_group(&mut self.profile, &update.profile);
                if let Some(documents) = &update.documents {
                    let mut replaced = documents.clone();
                    if replaced.tax_id.is_none() || replaced.tax_id_is_placeholder {
                        replaced.tax_id = self.documents.tax_id.take();
                        replaced.tax_id_is_placeholder = self.documents.tax_id_is_placeholder;
                    }
                    self.documents = replaced;
                }
                replace_group(&mut self.birth, &update.birth);
                replace_group(&mut self.education, &update.education);
                if let Some(record) = &update.record {
                    let mut replaced = record.clone();
                    if replaced.record_number.is_none() {
                        replaced.record_number = self.record.record_number.take();
                    }
                    self.record = replaced;
                }
                if update.phone.is_some() {
                    self.phone = update.phone.clone();
                }
                if update.address.is_some() {
                    self.address = update.address.clone();
                }
                if update.insurance.is_some() {
                    self.insurance = update.insurance.clone();
                }
                if let Some(tags) = &update.tags {
                    self.tags = tags.clone();
                }
            }
            UpdateMode::Merge => {
                if let Some(p) = &update.profile {
                    self.profile.merge_from(p);
                }
                if let Some(d) = &update.documents {
                    self.documents.merge_from(d);
                }
                if let Some(b) = &update.birth {
                    self.birth.merge_from(b);
                }
                if let Some(e) = &update.education {
                    self.education.merge_from(e);
                }
                if let Some(r) = &update.record {
                    self.record.merge_from(r);
                }
                merge_optional_group(&mut self.phone, &update.phone);
                merge_optional_group(&mut self.address, &update.address);
                merge_optional_group(&mut self.insurance, &update.insurance);
                if let Some(tags) = &update.tags {
                    for tag in tags {
                        if !self.tags.contains(tag) {
                            self.tags.push(tag.clone());
                        }
                    }
                }
            }
        }
    }
}

// ==========================================
// PatientUpdate - 更新补丁
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    Replace,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientUpdate {
    pub mode: UpdateMode,
    pub profile: Option<ProfileGroup>,
    pub documents: Option<DocumentsGroup>,
    pub birth: Option<BirthGroup>,
    pub education: Option<EducationGroup>,
    pub record: Option<RecordGroup>,
    pub phone: Option<Phone>,
    pub address: Option<Address>,
    pub insurance: Option<Insurance>,
    pub tags: Option<Vec<String>>,
}

// ==========================================
// RecordKey / LookupKey - 对账键
// ==========================================
/// 已有档案的键快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordKey {
    pub id: String,
    pub tax_id: Option<String>,
    pub record_number: Option<String>,
}

/// 精确匹配查询键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    TaxId(String),
    RecordNumber(String),
}

// ==========================================
// 字段级合并
// ==========================================
pub(crate) trait MergeFields {
    fn merge_from(&mut self, other: &Self);
}

fn merge_opt<T: Clone>(target: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        *target = incoming.clone();
    }
}

fn replace_group<T: Clone>(target: &mut T, incoming: &Option<T>) {
    if let Some(group) = incoming {
        *target = group.clone();
    }
}

fn merge_optional_group<T: Clone + MergeFields>(target: &mut Option<T>, incoming: &Option<T>) {
    match (target.as_mut(), incoming) {
        (Some(existing), Some(new)) => existing.merge_from(new),
        (None, Some(new)) => *target = Some(new.clone()),
        _ => {}
    }
}

impl MergeFields for ProfileGroup {
    fn merge_from(&mut self, o: &Self) {
        merge_opt(&mut self.full_name, &o.full_name);
        merge_opt(&mut self.social_name, &o.social_name);
        merge_opt(&mut self.sex, &o.sex);
        merge_opt(&mut self.marital_status, &o.marital_status);
        merge_opt(&mut self.occupation, &o.occupation);
        merge_opt(&mut self.nationality, &o.nationality);
        merge_opt(&mut self.mother_name, &o.mother_name);
        merge_opt(&mut self.father_name, &o.father_name);
        merge_opt(&mut self.responsible_name, &o.responsible_name);
        merge_opt(&mut self.responsible_tax_id, &o.responsible_tax_id);
        merge_opt(&mut self.email, &o.email);
        merge_opt(&mut self.notes, &o.notes);
    }
}

impl MergeFields for DocumentsGroup {
    fn merge_from(&mut self, o: &Self) {
        // 占位 CPF 不得覆盖真实 CPF
        if o.tax_id.is_some() && !o.tax_id_is_placeholder {
            self.tax_id = o.tax_id.clone();
            self.tax_id_is_placeholder = false;
        }
        merge_opt(&mut self.id_document, &o.id_document);
    }
}

impl MergeFields for BirthGroup {
    fn merge_from(&mut self, o: &Self) {
        merge_opt(&mut self.birth_date, &o.birth_date);
        merge_opt(&mut self.birth_date_raw, &o.birth_date_raw);
        merge_opt(&mut self.birth_place, &o.birth_place);
    }
}

impl MergeFields for EducationGroup {
    fn merge_from(&mut self, o: &Self) {
        merge_opt(&mut self.level, &o.level);
    }
}

impl MergeFields for RecordGroup {
    fn merge_from(&mut self, o: &Self) {
        merge_opt(&mut self.record_number, &o.record_number);
        merge_opt(&mut self.preferred_provider, &o.preferred_provider);
        merge_opt(&mut self.source, &o.source);
        merge_opt(&mut self.imported_at, &o.imported_at);
        self.pending_fields = o.pending_fields.clone();
    }
}

impl MergeFields for Phone {
    fn merge_from(&mut self, o: &Self) {
        if !o.number.is_empty() {
            self.number = o.number.clone();
            self.raw = o.raw.clone();
        }
    }
}

impl MergeFields for Address {
    fn merge_from(&mut self, o: &Self) {
        merge_opt(&mut self.street, &o.street);
        merge_opt(&mut self.number, &o.number);
        merge_opt(&mut self.complement, &o.complement);
        merge_opt(&mut self.neighborhood, &o.neighborhood);
        merge_opt(&mut self.city, &o.city);
        merge_opt(&mut self.state, &o.state);
        merge_opt(&mut self.postal_code, &o.postal_code);
    }
}

impl MergeFields for Insurance {
    fn merge_from(&mut self, o: &Self) {
        merge_opt(&mut self.name, &o.name);
        merge_opt(&mut self.card_number, &o.card_number);
        merge_opt(&mut self.plan, &o.plan);
    }
}
