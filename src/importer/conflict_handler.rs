// ==========================================
// 诊所管理系统 - 冲突处理器实现
// ==========================================
// 职责: 按冲突策略在已有档案键快照中精确匹配
// 规则:
//   create              → 从不匹配（重复由存储唯一约束兜底）
//   update_by_id        → CPF 精确匹配
//   update_by_reference → 档案号精确匹配
//   merge               → 先 CPF，再档案号
// ==========================================

use crate::domain::patient::{CanonicalRow, LookupKey, RecordKey};
use crate::domain::types::ConflictPolicy;
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::patient_importer_trait::{
    ConflictResolver, DataCleaner as DataCleanerTrait,
};
use crate::importer::tax_id::TAX_ID_LEN;
use std::collections::HashMap;

// ==========================================
// KeyIndex - 已有档案键快照（运行开始时加载一次）
// ==========================================
// 同一键对应多条档案时取首个
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    by_tax_id: HashMap<String, String>,
    by_record_number: HashMap<String, String>,
}

impl KeyIndex {
    pub fn from_keys(keys: Vec<RecordKey>) -> Self {
        let mut index = KeyIndex::default();
        for key in keys {
            if let Some(tax_id) = key.tax_id.filter(|t| !t.is_empty()) {
                index
                    .by_tax_id
                    .entry(tax_id)
                    .or_insert_with(|| key.id.clone());
            }
            if let Some(record_number) = key.record_number.filter(|r| !r.is_empty()) {
                index
                    .by_record_number
                    .entry(record_number)
                    .or_insert_with(|| key.id.clone());
            }
        }
        index
    }

    pub fn get(&self, key: &LookupKey) -> Option<&str> {
        let id = match key {
            LookupKey::TaxId(tax_id) => self.by_tax_id.get(tax_id),
            LookupKey::RecordNumber(number) => self.by_record_number.get(number),
        };
        id.map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_tax_id.len().max(self.by_record_number.len())
    }

    pub fn is_empty(&self) -> bool {
        self.by_tax_id.is_empty() && self.by_record_number.is_empty()
    }
}

pub struct ConflictHandler {
    cleaner: DataCleaner,
}

impl ConflictHandler {
    pub fn new() -> Self {
        Self {
            cleaner: DataCleaner,
        }
    }

    fn tax_key(&self, row: &CanonicalRow) -> Option<LookupKey> {
        let digits = self.cleaner.digits_only(row.tax_id.as_deref()?);
        (digits.len() == TAX_ID_LEN).then_some(LookupKey::TaxId(digits))
    }

    fn reference_key(&self, row: &CanonicalRow) -> Option<LookupKey> {
        let number = row.record_number.as_deref()?.trim();
        (!number.is_empty()).then(|| LookupKey::RecordNumber(number.to_string()))
    }
}

impl Default for ConflictHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictResolver for ConflictHandler {
    fn lookup_plan(&self, row: &CanonicalRow, policy: ConflictPolicy) -> Vec<LookupKey> {
        let keys = match policy {
            ConflictPolicy::Create => vec![],
            ConflictPolicy::UpdateById => vec![self.tax_key(row)],
            ConflictPolicy::UpdateByReference => vec![self.reference_key(row)],
            ConflictPolicy::Merge => vec![self.tax_key(row), self.reference_key(row)],
        };
        keys.into_iter().flatten().collect()
    }

    fn resolve(
        &self,
        row: &CanonicalRow,
        policy: ConflictPolicy,
        index: &KeyIndex,
    ) -> Option<String> {
        self.lookup_plan(row, policy)
            .iter()
            .find_map(|key| index.get(key))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> KeyIndex {
        KeyIndex::from_keys(vec![
            RecordKey {
                id: "p-1".to_string(),
                tax_id: Some("52998224725".to_string()),
                record_number: Some("P-001".to_string()),
            },
            RecordKey {
                id: "p-2".to_string(),
                tax_id: Some("11144477735".to_string()),
                record_number: Some("P-002".to_string()),
            },
            RecordKey {
                id: "p-3".to_string(),
                tax_id: None,
                record_number: Some("P-001".to_string()),
            },
        ])
    }

    fn row(tax_id: Option<&str>, record_number: Option<&str>) -> CanonicalRow {
        CanonicalRow {
            full_name: Some("Ana".to_string()),
            tax_id: tax_id.map(str::to_string),
            record_number: record_number.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_never_matches() {
        let handler = ConflictHandler::new();
        let r = row(Some("529.982.247-25"), Some("P-001"));
        assert_eq!(handler.resolve(&r, ConflictPolicy::Create, &index()), None);
        assert!(handler.lookup_plan(&r, ConflictPolicy::Create).is_empty());
    }

    #[test]
    fn test_update_by_id_matches_formatted_tax_id() {
        let handler = ConflictHandler::new();
        let r = row(Some("529.982.247-25"), None);
        assert_eq!(
            handler.resolve(&r, ConflictPolicy::UpdateById, &index()),
            Some("p-1".to_string())
        );
    }

    #[test]
    fn test_update_by_reference_first_found_wins() {
        let handler = ConflictHandler::new();
        let r = row(None, Some(" P-001 "));
        assert_eq!(
            handler.resolve(&r, ConflictPolicy::UpdateByReference, &index()),
            Some("p-1".to_string())
        );
    }

    #[test]
    fn test_merge_prefers_tax_id_then_reference() {
        let handler = ConflictHandler::new();

        let both = row(Some("11144477735"), Some("P-001"));
        assert_eq!(
            handler.resolve(&both, ConflictPolicy::Merge, &index()),
            Some("p-2".to_string())
        );

        let reference_only = row(Some("39053344705"), Some("P-002"));
        assert_eq!(
            handler.resolve(&reference_only, ConflictPolicy::Merge, &index()),
            Some("p-2".to_string())
        );

        let none = row(None, Some("P-999"));
        assert_eq!(handler.resolve(&none, ConflictPolicy::Merge, &index()), None);
    }

    #[test]
    fn test_exact_match_only() {
        let handler = ConflictHandler::new();
        // 位数不足不参与匹配
        let short = row(Some("5299822472"), None);
        assert!(handler.lookup_plan(&short, ConflictPolicy::UpdateById).is_empty());

        let case_differs = row(None, Some("p-001"));
        assert_eq!(
            handler.resolve(&case_differs, ConflictPolicy::UpdateByReference, &index()),
            None
        );
    }
}
