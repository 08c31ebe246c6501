// ==========================================
// 诊所管理系统 - 载荷构建器实现
// ==========================================
// 职责: 标准行 → 新建载荷 / 更新补丁
// 规则:
//   - CPF 取纯数字；不足 11 位或缺失时写入占位值并打标记
//   - 更新补丁只携带行内有值的字段组，占位 CPF 不进入补丁
// ==========================================

use crate::domain::import::ValidationOutcome;
use crate::domain::patient::{
    Address, BirthGroup, CanonicalRow, DocumentsGroup, EducationGroup, Insurance,
    PatientPayload, PatientUpdate, Phone, ProfileGroup, RecordGroup, UpdateMode,
};
use crate::domain::types::Sex;
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::patient_importer_trait::{
    DataCleaner as DataCleanerTrait, PayloadBuilder,
};
use crate::importer::tax_id::{PlaceholderTaxIds, TAX_ID_LEN};
use chrono::Utc;

pub const DEFAULT_SOURCE: &str = "importacao_em_lote";

const POSTAL_CODE_LEN: usize = 8;

pub struct PatientPayloadBuilder {
    cleaner: DataCleaner,
    source: String, // 写入 record.source 的来源标识
}

impl PatientPayloadBuilder {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            cleaner: DataCleaner,
            source: source.into(),
        }
    }

    fn text(&self, value: Option<&str>) -> Option<String> {
        self.cleaner
            .normalize_null(value.map(|v| self.cleaner.clean_text(v, false)))
    }

    fn tax_digits(&self, row: &CanonicalRow) -> Option<String> {
        let digits = self.cleaner.digits_only(row.tax_id.as_deref()?);
        (digits.len() == TAX_ID_LEN).then_some(digits)
    }

    fn profile(&self, row: &CanonicalRow) -> Option<ProfileGroup> {
        let group = ProfileGroup {
            full_name: self.text(row.full_name.as_deref()),
            social_name: self.text(row.social_name.as_deref()),
            sex: row.sex.as_deref().and_then(Sex::parse),
            marital_status: self.text(row.marital_status.as_deref()),
            occupation: self.text(row.occupation.as_deref()),
            nationality: self.text(row.nationality.as_deref()),
            mother_name: self.text(row.mother_name.as_deref()),
            father_name: self.text(row.father_name.as_deref()),
            responsible_name: self.text(row.responsible_name.as_deref()),
            responsible_tax_id: row
                .responsible_tax_id
                .as_deref()
                .map(|v| self.cleaner.digits_only(v))
                .filter(|d| !d.is_empty()),
            email: self.cleaner.clean_email(row.email.as_deref()),
            notes: self.text(row.notes.as_deref()),
        };
        (group != ProfileGroup::default()).then_some(group)
    }

    fn documents(&self, row: &CanonicalRow) -> Option<DocumentsGroup> {
        let group = DocumentsGroup {
            tax_id: self.tax_digits(row),
            tax_id_is_placeholder: false,
            id_document: self.text(row.id_document.as_deref()),
        };
        (group != DocumentsGroup::default()).then_some(group)
    }

    fn birth(&self, row: &CanonicalRow) -> Option<BirthGroup> {
        let raw = self.text(row.birth_date.as_deref());
        let today = Utc::now().date_naive();
        let group = BirthGroup {
            birth_date: raw
                .as_deref()
                .and_then(|v| self.cleaner.parse_birth_date(v, today)),
            birth_date_raw: raw,
            birth_place: self.text(row.birth_place.as_deref()),
        };
        (group != BirthGroup::default()).then_some(group)
    }

    fn education(&self, row: &CanonicalRow) -> Option<EducationGroup> {
        self.text(row.education.as_deref())
            .map(|level| EducationGroup { level: Some(level) })
    }

    fn phone(&self, row: &CanonicalRow) -> Option<Phone> {
        [row.phone.as_deref(), row.phone_secondary.as_deref()]
            .into_iter()
            .flatten()
            .map(|raw| Phone {
                number: self.cleaner.digits_only(raw),
                raw: raw.trim().to_string(),
            })
            .find(|phone| !phone.number.is_empty())
    }

    fn address(&self, row: &CanonicalRow) -> Option<Address> {
        let postal_code = self.text(row.postal_code.as_deref()).map(|raw| {
            let digits = self.cleaner.digits_only(&raw);
            if digits.len() == POSTAL_CODE_LEN {
                digits
            } else {
                raw
            }
        });
        let group = Address {
            street: self.text(row.street.as_deref()),
            number: self.text(row.street_number.as_deref()),
            complement: self.text(row.complement.as_deref()),
            neighborhood: self.text(row.neighborhood.as_deref()),
            city: self.text(row.city.as_deref()),
            state: self.cleaner.clean_state(row.state.clone()),
            postal_code,
        };
        (group != Address::default()).then_some(group)
    }

    fn insurance(&self, row: &CanonicalRow) -> Option<Insurance> {
        let group = Insurance {
            name: self.text(row.insurance_name.as_deref()),
            card_number: self.text(row.insurance_card_number.as_deref()),
            plan: self.text(row.insurance_plan.as_deref()),
        };
        (group != Insurance::default()).then_some(group)
    }

    fn record(&self, row: &CanonicalRow, outcome: &ValidationOutcome) -> RecordGroup {
        RecordGroup {
            record_number: self.text(row.record_number.as_deref()),
            preferred_provider: self.text(row.preferred_provider.as_deref()),
            pending_fields: outcome.pending_fields.clone(),
            source: Some(self.source.clone()),
            imported_at: Some(Utc::now()),
        }
    }
}

impl Default for PatientPayloadBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE)
    }
}

impl PayloadBuilder for PatientPayloadBuilder {
    fn build_create(
        &self,
        row: &CanonicalRow,
        outcome: &ValidationOutcome,
        placeholders: &mut PlaceholderTaxIds,
    ) -> PatientPayload {
        let mut documents = self.documents(row).unwrap_or_default();
        if documents.tax_id.is_none() {
            documents.tax_id = Some(placeholders.next_tax_id());
            documents.tax_id_is_placeholder = true;
        }

        PatientPayload {
            profile: self.profile(row).unwrap_or_default(),
            documents,
            birth: self.birth(row).unwrap_or_default(),
            education: self.education(row).unwrap_or_default(),
            record: self.record(row, outcome),
            phone: self.phone(row),
            address: self.address(row),
            insurance: self.insurance(row),
            tags: self.cleaner.split_tags(row.tags.as_deref()),
        }
    }

    fn build_update(
        &self,
        row: &CanonicalRow,
        outcome: &ValidationOutcome,
        mode: UpdateMode,
    ) -> PatientUpdate {
        let tags = self.cleaner.split_tags(row.tags.as_deref());

        PatientUpdate {
            mode,
            profile: self.profile(row),
            documents: self.documents(row),
            birth: self.birth(row),
            education: self.education(row),
            record: Some(self.record(row, outcome)),
            phone: self.phone(row),
            address: self.address(row),
            insurance: self.insurance(row),
            tags: (!tags.is_empty()).then_some(tags),
        }
    }
}
