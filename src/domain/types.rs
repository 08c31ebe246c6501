// ==========================================
// 诊所管理系统 - 导入领域类型定义
// ==========================================
// 职责: 冲突策略 / 行状态 / 进度阶段 / 待补字段 等枚举
// 序列化: 与外部契约保持一致（策略小写、状态大写）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 冲突策略 (Conflict Policy)
// ==========================================
// 决定导入行是更新已有档案还是新建档案
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    Create,            // 始终新建
    UpdateById,        // 按 CPF 精确匹配
    UpdateByReference, // 按档案号匹配
    Merge,             // 先 CPF 后档案号，字段合并
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Create => "create",
            ConflictPolicy::UpdateById => "update_by_id",
            ConflictPolicy::UpdateByReference => "update_by_reference",
            ConflictPolicy::Merge => "merge",
        }
    }

    /// 是否需要与已有档案对账
    pub fn reconciles(&self) -> bool {
        !matches!(self, ConflictPolicy::Create)
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(ConflictPolicy::Create),
            "update_by_id" => Ok(ConflictPolicy::UpdateById),
            "update_by_reference" => Ok(ConflictPolicy::UpdateByReference),
            "merge" => Ok(ConflictPolicy::Merge),
            other => Err(format!(
                "无效的冲突策略: {}，应为 create/update_by_id/update_by_reference/merge",
                other
            )),
        }
    }
}

// ==========================================
// 行终态 (Row Status)
// ==========================================
// 报告中按枚举名原样输出，供下游工具过滤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    Created,
    Updated,
    Merged,
    DuplicateSkipped,
    Ignored,
    TechnicalError,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Created => "CREATED",
            RowStatus::Updated => "UPDATED",
            RowStatus::Merged => "MERGED",
            RowStatus::DuplicateSkipped => "DUPLICATE_SKIPPED",
            RowStatus::Ignored => "IGNORED",
            RowStatus::TechnicalError => "TECHNICAL_ERROR",
        }
    }

    /// 是否为已落库的终态
    pub fn is_persisted(&self) -> bool {
        matches!(
            self,
            RowStatus::Created | RowStatus::Updated | RowStatus::Merged
        )
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 进度阶段 (Import Phase)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportPhase {
    Reading,
    Validating,
    Saving,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportPhase::Reading => write!(f, "reading"),
            ImportPhase::Validating => write!(f, "validating"),
            ImportPhase::Saving => write!(f, "saving"),
        }
    }
}

// ==========================================
// 实时条目类型 (Live Item Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveItemType {
    Ignored,
    Imported,
    ImportedPending,
    Merged,
    DuplicateSkipped,
    Error,
}

// ==========================================
// 性别 (Sex)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    /// 从表格文本解析性别（无法识别返回 None）
    pub fn parse(value: &str) -> Option<Sex> {
        match value.trim().to_lowercase().as_str() {
            "m" | "masc" | "masculino" | "homem" | "male" => Some(Sex::Male),
            "f" | "fem" | "feminino" | "mulher" | "female" => Some(Sex::Female),
            "o" | "outro" | "outros" | "other" | "nao binario" | "não binário" => {
                Some(Sex::Other)
            }
            _ => None,
        }
    }
}

// ==========================================
// 待补字段 (Pending Field)
// ==========================================
// 业务上"应有但不阻断导入"的数据缺口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingField {
    FullName,
    TaxIdOrDocument,
    Sex,
    BirthDate,
    Email,
    Phone,
    Address,
    RecordNumber,
    ResponsibleName,
    ResponsibleTaxId,
}

impl PendingField {
    /// 关键子集：不阻断创建，但业务视为必备
    pub const CRITICAL: [PendingField; 4] = [
        PendingField::FullName,
        PendingField::TaxIdOrDocument,
        PendingField::Sex,
        PendingField::BirthDate,
    ];

    pub fn is_critical(&self) -> bool {
        Self::CRITICAL.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PendingField::FullName => "nome",
            PendingField::TaxIdOrDocument => "cpf_ou_documento",
            PendingField::Sex => "sexo",
            PendingField::BirthDate => "data_nascimento",
            PendingField::Email => "email",
            PendingField::Phone => "telefone",
            PendingField::Address => "endereco",
            PendingField::RecordNumber => "prontuario",
            PendingField::ResponsibleName => "responsavel_nome",
            PendingField::ResponsibleTaxId => "responsavel_cpf",
        }
    }
}

impl fmt::Display for PendingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_policy_from_str() {
        assert_eq!("merge".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Merge));
        assert_eq!(
            " Update_By_Id ".parse::<ConflictPolicy>(),
            Ok(ConflictPolicy::UpdateById)
        );
        assert!("upsert".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn test_row_status_serialization() {
        let json = serde_json::to_string(&RowStatus::DuplicateSkipped).unwrap();
        assert_eq!(json, "\"DUPLICATE_SKIPPED\"");
        assert_eq!(RowStatus::TechnicalError.to_string(), "TECHNICAL_ERROR");
    }

    #[test]
    fn test_sex_parse() {
        assert_eq!(Sex::parse(" F "), Some(Sex::Female));
        assert_eq!(Sex::parse("Masculino"), Some(Sex::Male));
        assert_eq!(Sex::parse("?"), None);
    }
}
