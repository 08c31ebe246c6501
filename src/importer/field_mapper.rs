// ==========================================
// 诊所管理系统 - 字段映射器实现
// ==========================================
// 职责: 原始表头 → 标准字段（别名表）+ 原始行 → 标准行
// 匹配: 先全表精确匹配，再全表包含匹配；表顺序决定优先级
// 红线: 未命中的表头以 slug 保留，不静默丢弃
// ==========================================

use crate::domain::patient::{CanonicalField, CanonicalRow, FieldKey};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::file_parser::{EnvelopeBody, RawRow};
use crate::importer::patient_importer_trait::{
    DataCleaner as DataCleanerTrait, FieldAliasResolver, RowNormalizer,
};

/// 编号写法的各种变体（"nº" / "n°" / "no." / "num" ...）统一折叠为 "numero"
const NUMBER_TOKENS: [&str; 7] = ["n", "no", "nr", "nro", "num", "numero", "number"];

/// 包含匹配中"表头被同义词包含"方向的最短表头长度
const MIN_CONTAINED_LEN: usize = 3;

/// 仅参与精确匹配的短同义词（"RG / ID" 不应因 "id" 命中编号字段）
const EXACT_ONLY_SYNONYMS: [&str; 2] = ["id", "dn"];

/// 亲属/监护人限定词
const RELATION_TERMS: [&str; 4] = ["responsavel", "mae", "pai", "guardian"];

/// 判定限定列剩余部分时忽略的连接词
const CONNECTOR_TOKENS: [&str; 7] = ["do", "da", "de", "dos", "das", "legal", "of"];

/// 别名表（具体字段在前，通用字段在后）
const ALIAS_TABLE: &[(CanonicalField, &[&str])] = &[
    (
        CanonicalField::ResponsibleTaxId,
        &["cpf do responsavel", "cpf responsavel", "cpf responsavel legal"],
    ),
    (
        CanonicalField::ResponsibleName,
        &[
            "responsavel",
            "nome do responsavel",
            "nome responsavel",
            "responsavel legal",
            "guardian",
        ],
    ),
    (
        CanonicalField::MotherName,
        &["nome da mae", "nome mae", "mae", "filiacao mae", "mother name"],
    ),
    (
        CanonicalField::FatherName,
        &["nome do pai", "nome pai", "pai", "filiacao pai", "father name"],
    ),
    (CanonicalField::SocialName, &["nome social", "apelido", "social name"]),
    (
        CanonicalField::PhoneSecondary,
        &[
            "telefone 2",
            "telefone secundario",
            "telefone fixo",
            "telefone residencial",
            "telefone comercial",
            "telefone alternativo",
            "outro telefone",
            "fone 2",
            "celular 2",
            "phone 2",
        ],
    ),
    (
        CanonicalField::InsuranceCardNumber,
        &[
            "carteirinha",
            "numero da carteirinha",
            "numero carteirinha",
            "carteira do convenio",
            "matricula convenio",
            "insurance card",
        ],
    ),
    (
        CanonicalField::InsurancePlan,
        &["plano", "tipo de plano", "categoria do plano", "insurance plan"],
    ),
    (
        CanonicalField::InsuranceName,
        &[
            "convenio",
            "nome do convenio",
            "plano de saude",
            "operadora",
            "insurance",
        ],
    ),
    (
        CanonicalField::RecordNumber,
        &[
            "prontuario",
            "numero prontuario",
            "numero do prontuario",
            "codigo",
            "codigo do paciente",
            "codigo paciente",
            "id",
            "id paciente",
            "ficha",
            "numero da ficha",
            "referencia",
            "numero de referencia",
            "matricula",
            "record number",
            "reference",
        ],
    ),
    (
        CanonicalField::PreferredProvider,
        &[
            "profissional",
            "profissional preferencial",
            "medico",
            "medico responsavel",
            "dentista",
            "terapeuta",
            "preferred provider",
        ],
    ),
    (CanonicalField::MaritalStatus, &["estado civil", "marital status"]),
    (
        CanonicalField::BirthPlace,
        &[
            "naturalidade",
            "local de nascimento",
            "cidade natal",
            "cidade de nascimento",
            "birth place",
        ],
    ),
    (
        CanonicalField::BirthDate,
        &[
            "data de nascimento",
            "data nascimento",
            "nascimento",
            "dt nascimento",
            "dt nasc",
            "data nasc",
            "dn",
            "aniversario",
            "birth date",
            "birthdate",
            "date of birth",
        ],
    ),
    (
        CanonicalField::FullName,
        &[
            "nome",
            "nome completo",
            "nome do paciente",
            "nome paciente",
            "paciente",
            "cliente",
            "nome cliente",
            "full name",
            "name",
        ],
    ),
    (
        CanonicalField::TaxId,
        &[
            "cpf",
            "cpf paciente",
            "cpf do paciente",
            "numero cpf",
            "numero do cpf",
            "tax id",
        ],
    ),
    (
        CanonicalField::IdDocument,
        &[
            "rg",
            "identidade",
            "documento de identidade",
            "carteira de identidade",
            "documento",
            "rne",
            "passaporte",
            "id document",
        ],
    ),
    (
        CanonicalField::Sex,
        &["sexo", "genero", "sexo biologico", "gender", "sex"],
    ),
    (
        CanonicalField::Email,
        &["email", "e mail", "correio eletronico", "endereco eletronico"],
    ),
    (
        CanonicalField::Phone,
        &[
            "telefone",
            "celular",
            "fone",
            "tel",
            "whatsapp",
            "telefone celular",
            "telefone 1",
            "celular 1",
            "contato",
            "phone",
            "mobile",
        ],
    ),
    (
        CanonicalField::PostalCode,
        &["cep", "codigo postal", "postal code", "zip", "zip code"],
    ),
    (
        CanonicalField::StreetNumber,
        &["numero", "numero endereco", "numero residencia", "numero da casa"],
    ),
    (
        CanonicalField::Complement,
        &["complemento", "apto", "apartamento"],
    ),
    (
        CanonicalField::Neighborhood,
        &["bairro", "neighborhood", "district"],
    ),
    (
        CanonicalField::Street,
        &["endereco", "logradouro", "rua", "endereco completo", "address", "street"],
    ),
    (CanonicalField::City, &["cidade", "municipio", "city"]),
    (CanonicalField::State, &["estado", "uf", "state"]),
    (
        CanonicalField::Education,
        &["escolaridade", "grau de instrucao", "instrucao", "education"],
    ),
    (
        CanonicalField::Occupation,
        &["profissao", "ocupacao", "cargo", "occupation"],
    ),
    (
        CanonicalField::Nationality,
        &["nacionalidade", "pais", "nationality"],
    ),
    (
        CanonicalField::Tags,
        &["tags", "etiquetas", "marcadores", "grupo"],
    ),
    (
        CanonicalField::Notes,
        &[
            "observacoes",
            "observacao",
            "obs",
            "notas",
            "anotacoes",
            "comentarios",
            "notes",
        ],
    ),
];

// ==========================================
// HeaderMapping - 单文件表头映射
// ==========================================
// 按文件列顺序保存，逐行复用
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMapping {
    entries: Vec<(String, FieldKey)>,
}

impl HeaderMapping {
    pub fn entries(&self) -> &[(String, FieldKey)] {
        &self.entries
    }

    pub fn key_for(&self, header: &str) -> Option<&FieldKey> {
        self.entries
            .iter()
            .find(|(raw, _)| raw == header)
            .map(|(_, key)| key)
    }

    /// 命中标准字段的列数
    pub fn canonical_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, key)| matches!(key, FieldKey::Canonical(_)))
            .count()
    }

    /// 未命中别名表的原始表头
    pub fn unmapped_headers(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, key)| matches!(key, FieldKey::Extra(_)))
            .map(|(raw, _)| raw.as_str())
            .collect()
    }
}

// ==========================================
// FieldMapper - 别名解析 + 行标准化
// ==========================================
pub struct FieldMapper {
    cleaner: DataCleaner,
}

impl FieldMapper {
    pub fn new() -> Self {
        Self {
            cleaner: DataCleaner,
        }
    }

    fn tokens(&self, header: &str) -> Vec<String> {
        let folded = self.cleaner.fold_diacritics(&header.to_lowercase());
        let spaced: String = folded
            .chars()
            .map(|c| match c {
                '#' => ' ',
                c if c.is_alphanumeric() => c,
                _ => ' ',
            })
            .collect();

        let mut tokens: Vec<String> = Vec::new();
        if folded.contains('#') {
            tokens.push("numero".to_string());
        }
        for token in spaced.split_whitespace() {
            if NUMBER_TOKENS.contains(&token) {
                tokens.push("numero".to_string());
            } else {
                tokens.push(token.to_string());
            }
        }
        tokens
    }

    /// 表头 slug（未命中别名表时作为临时键）
    pub fn slugify(&self, header: &str) -> String {
        let slug = self.tokens(header).join("_");
        if slug.is_empty() {
            "coluna".to_string()
        } else {
            slug
        }
    }

    /// 亲属/监护人的非姓名列（"Telefone do Responsável"、"E-mail da mãe"）
    ///
    /// 去掉限定词与连接词后，剩余部分命中姓名、CPF 以外的其他字段
    fn is_relation_detail(&self, normalized: &str) -> bool {
        let Some(relation) = RELATION_TERMS
            .iter()
            .find(|term| contains_phrase(normalized, term))
        else {
            return false;
        };

        let rest = normalized
            .split_whitespace()
            .filter(|token| token != relation && !CONNECTOR_TOKENS.contains(token))
            .collect::<Vec<_>>()
            .join(" ");
        if rest.is_empty() {
            return false;
        }

        ALIAS_TABLE
            .iter()
            .filter(|(field, _)| !is_relation_or_identity(*field))
            .any(|(_, synonyms)| {
                synonyms
                    .iter()
                    .filter(|synonym| !EXACT_ONLY_SYNONYMS.contains(synonym))
                    .any(|synonym| contains_phrase(&rest, synonym))
            })
    }

    /// JSON 信封 → 标准行（fields 优先，raw 经别名解析补充）
    pub fn normalize_envelope(&self, body: &EnvelopeBody) -> CanonicalRow {
        let mut row = CanonicalRow::default();

        for (key, value) in body.field_texts() {
            let field_key = CanonicalField::from_key(&key)
                .map(FieldKey::Canonical)
                .unwrap_or_else(|| self.resolve_header(&key));
            row.set_if_empty(&field_key, &value);
        }

        for (header, value) in body.raw_texts() {
            row.set_if_empty(&self.resolve_header(&header), &value);
        }

        row
    }
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::new()
    }
}

fn is_relation_or_identity(field: CanonicalField) -> bool {
    matches!(
        field,
        CanonicalField::ResponsibleTaxId
            | CanonicalField::ResponsibleName
            | CanonicalField::MotherName
            | CanonicalField::FatherName
            | CanonicalField::FullName
            | CanonicalField::TaxId
    )
}

/// 短语包含（按词边界）
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

impl FieldAliasResolver for FieldMapper {
    fn normalize_header(&self, header: &str) -> String {
        self.tokens(header).join(" ")
    }

    fn resolve_header(&self, header: &str) -> FieldKey {
        let normalized = self.normalize_header(header);
        if normalized.is_empty() {
            return FieldKey::Extra(self.slugify(header));
        }

        // 精确匹配
        for (field, synonyms) in ALIAS_TABLE {
            if synonyms.contains(&normalized.as_str()) {
                return FieldKey::Canonical(*field);
            }
        }
        if let Some(field) = CanonicalField::from_key(&normalized.replace(' ', "_")) {
            return FieldKey::Canonical(field);
        }

        // 亲属联系方式等不归入任何患者字段，保留为临时键
        if self.is_relation_detail(&normalized) {
            return FieldKey::Extra(self.slugify(header));
        }

        // 包含匹配
        for (field, synonyms) in ALIAS_TABLE {
            let hit = synonyms.iter().any(|synonym| {
                (!EXACT_ONLY_SYNONYMS.contains(synonym) && contains_phrase(&normalized, synonym))
                    || (normalized.len() >= MIN_CONTAINED_LEN
                        && contains_phrase(synonym, &normalized))
            });
            if hit {
                return FieldKey::Canonical(*field);
            }
        }

        FieldKey::Extra(self.slugify(header))
    }

    fn build_mapping(&self, headers: &[String]) -> HeaderMapping {
        let entries = headers
            .iter()
            .map(|header| (header.clone(), self.resolve_header(header)))
            .collect();
        HeaderMapping { entries }
    }
}

impl RowNormalizer for FieldMapper {
    fn normalize_row(&self, mapping: &HeaderMapping, row: &RawRow) -> CanonicalRow {
        let mut canonical = CanonicalRow::default();
        for (header, key) in mapping.entries() {
            if let Some(value) = row.get(header) {
                canonical.set_if_empty(key, value);
            }
        }
        canonical
    }
}
