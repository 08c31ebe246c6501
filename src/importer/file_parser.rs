// ==========================================
// 诊所管理系统 - 文件解析器实现
// ==========================================
// 支持: CSV (.csv) / Excel 首个工作表 (.xlsx/.xls) / 单条 JSON 信封 (.json)
// 契约: 行进，原始表出；不做字段语义判断
// ==========================================

use crate::importer::data_cleaner::serial_to_date;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::patient_importer_trait::FileParser;
use calamine::{open_workbook_auto, Data, Reader};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// 原始行（原始表头 → 单元格文本）
pub type RawRow = HashMap<String, String>;

// ==========================================
// RawTable - 原始表
// ==========================================
// headers 保留文件中的列顺序，用于"首个非空值胜出"的确定性判定
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 由表头与逐行单元格构建（跳过全空行，重复表头保留首个非空值）
    fn from_cells<I, R>(raw_headers: Vec<String>, records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = String>,
    {
        let headers: Vec<String> = raw_headers
            .into_iter()
            .enumerate()
            .map(|(idx, h)| {
                let cleaned = h.trim_start_matches('\u{feff}').trim().to_string();
                if cleaned.is_empty() {
                    format!("coluna_{}", idx + 1)
                } else {
                    cleaned
                }
            })
            .collect();

        let mut rows = Vec::new();
        for record in records {
            let mut row_map: RawRow = HashMap::new();
            for (col_idx, value) in record.into_iter().enumerate() {
                let Some(header) = headers.get(col_idx) else {
                    continue;
                };
                let value = value.trim().to_string();
                let slot = row_map.entry(header.clone()).or_default();
                if slot.is_empty() {
                    *slot = value;
                }
            }

            // 跳过完全空白的行
            if row_map.values().all(|v| v.is_empty()) {
                continue;
            }
            rows.push(row_map);
        }

        let mut unique_headers: Vec<String> = Vec::with_capacity(headers.len());
        for header in headers {
            if !unique_headers.contains(&header) {
                unique_headers.push(header);
            }
        }

        RawTable {
            headers: unique_headers,
            rows,
        }
    }
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

/// 读取文本（UTF-8 优先，失败时按 Latin-1 逐字节解码）
fn read_text(path: &Path) -> ImportResult<String> {
    let bytes = fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => Ok(err.into_bytes().iter().map(|b| *b as char).collect()),
    }
}

/// 根据表头行嗅探分隔符（';' 多于 ',' 时使用 ';'）
fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or_default();
    let semicolons = first_line.matches(';').count();
    let commas = first_line.matches(',').count();
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl CsvParser {
    /// 解析内存中的 CSV 文本
    pub fn parse_text(&self, text: &str) -> ImportResult<RawTable> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .delimiter(sniff_delimiter(text))
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(ImportError::EmptyFile);
        }

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result?;
            records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        Ok(RawTable::from_cells(headers, records))
    }
}

impl FileParser for CsvParser {
    fn parse_to_raw_table(&self, file_path: &Path) -> ImportResult<RawTable> {
        ensure_exists(file_path)?;
        let text = read_text(file_path)?;
        self.parse_text(&text)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_to_raw_table(&self, file_path: &Path) -> ImportResult<RawTable> {
        ensure_exists(file_path)?;

        let mut workbook = open_workbook_auto(file_path)?;

        // 读取第一个 sheet
        let sheet_names = workbook.sheet_names();
        let Some(sheet_name) = sheet_names.first().cloned() else {
            return Err(ImportError::ExcelParseError("Excel 文件无工作表".to_string()));
        };
        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut rows = range.rows();
        let header_row = rows.next().ok_or(ImportError::EmptyFile)?;
        let headers: Vec<String> = header_row.iter().map(|cell| cell.to_string()).collect();

        let records = rows.map(|data_row| data_row.iter().map(cell_text).collect::<Vec<_>>());

        Ok(RawTable::from_cells(headers, records))
    }
}

/// 单元格 → 文本；日期格式单元格转为 ISO 日期
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::DateTime(value) => serial_to_date(value.as_f64())
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| cell.to_string()),
        Data::DateTimeIso(text) => text.clone(),
        other => other.to_string(),
    }
}

// ==========================================
// JSON 信封: { "patient": { "fields": {...}, "raw": {...} } }
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PatientEnvelope {
    pub patient: EnvelopeBody,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EnvelopeBody {
    /// 已按标准字段键组织的值
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
    /// 原始表头 → 值
    #[serde(default)]
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl EnvelopeBody {
    pub fn field_texts(&self) -> Vec<(String, String)> {
        to_texts(&self.fields)
    }

    pub fn raw_texts(&self) -> Vec<(String, String)> {
        to_texts(&self.raw)
    }
}

fn to_texts(values: &BTreeMap<String, serde_json::Value>) -> Vec<(String, String)> {
    values
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}

pub struct JsonEnvelopeParser;

impl JsonEnvelopeParser {
    pub fn parse_file(&self, file_path: &Path) -> ImportResult<PatientEnvelope> {
        ensure_exists(file_path)?;
        let text = read_text(file_path)?;
        self.parse_text(&text)
    }

    pub fn parse_text(&self, text: &str) -> ImportResult<PatientEnvelope> {
        let envelope: PatientEnvelope = serde_json::from_str(text)?;
        Ok(envelope)
    }
}

// ==========================================
// 源文件类型（根据扩展名判定）
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Csv,
    Spreadsheet,
    JsonEnvelope,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> ImportResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => Ok(SourceKind::Csv),
            "xlsx" | "xls" => Ok(SourceKind::Spreadsheet),
            "json" => Ok(SourceKind::JsonEnvelope),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

// ==========================================
// 通用表格解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse_to_raw_table(&self, file_path: &Path) -> ImportResult<RawTable> {
        match SourceKind::from_path(file_path)? {
            SourceKind::Csv => CsvParser.parse_to_raw_table(file_path),
            SourceKind::Spreadsheet => ExcelParser.parse_to_raw_table(file_path),
            SourceKind::JsonEnvelope => Err(ImportError::UnsupportedFormat(
                "json（单条记录请走 JSON 信封路径）".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_csv_parser_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "Nome,CPF,Telefone").unwrap();
        writeln!(temp_file, "Ana Lima,529.982.247-25,(81) 99999-0000").unwrap();
        writeln!(temp_file, "Bruno Reis,,81988887777").unwrap();

        let table = CsvParser.parse_to_raw_table(temp_file.path()).unwrap();

        assert_eq!(table.headers, vec!["Nome", "CPF", "Telefone"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].get("Nome"), Some(&"Ana Lima".to_string()));
        assert_eq!(table.rows[1].get("CPF"), Some(&"".to_string()));
    }

    #[test]
    fn test_csv_parser_quoted_fields() {
        let text = "nome,observacoes\n\"Silva, Ana\",\"disse \"\"oi\"\"\nna recepção\"\n";
        let table = CsvParser.parse_text(text).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0]["nome"], "Silva, Ana");
        assert_eq!(table.rows[0]["observacoes"], "disse \"oi\"\nna recepção");
    }

    #[test]
    fn test_csv_parser_semicolon_and_bom() {
        let text = "\u{feff}Nome;Cidade\nAna;Recife\n";
        let table = CsvParser.parse_text(text).unwrap();

        assert_eq!(table.headers, vec!["Nome", "Cidade"]);
        assert_eq!(table.rows[0]["Cidade"], "Recife");
    }

    #[test]
    fn test_csv_parser_skip_empty_rows() {
        let text = "nome,cpf\nAna,1\n,\nBia,2\n";
        let table = CsvParser.parse_text(text).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_csv_parser_duplicate_header_keeps_first_non_empty() {
        let text = "telefone,telefone\n,81999990000\n81911112222,81933334444\n";
        let table = CsvParser.parse_text(text).unwrap();

        assert_eq!(table.headers, vec!["telefone"]);
        assert_eq!(table.rows[0]["telefone"], "81999990000");
        assert_eq!(table.rows[1]["telefone"], "81911112222");
    }

    #[test]
    fn test_csv_parser_file_not_found() {
        let result = CsvParser.parse_to_raw_table(Path::new("non_existent.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_excel_cell_text_converts_dates() {
        use calamine::{ExcelDateTime, ExcelDateTimeType};

        let date_cell = Data::DateTime(ExcelDateTime::new(
            32937.0,
            ExcelDateTimeType::DateTime,
            false,
        ));
        assert_eq!(cell_text(&date_cell), "1990-03-05");
        assert_eq!(
            cell_text(&Data::DateTimeIso("1990-03-05T00:00:00".to_string())),
            "1990-03-05T00:00:00"
        );
        assert_eq!(cell_text(&Data::String("Ana".to_string())), "Ana");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn test_source_kind_by_extension() {
        assert_eq!(
            SourceKind::from_path(Path::new("a.CSV")).unwrap(),
            SourceKind::Csv
        );
        assert_eq!(
            SourceKind::from_path(Path::new("a.xls")).unwrap(),
            SourceKind::Spreadsheet
        );
        assert_eq!(
            SourceKind::from_path(Path::new("a.json")).unwrap(),
            SourceKind::JsonEnvelope
        );
        assert!(matches!(
            SourceKind::from_path(Path::new("a.pdf")),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_json_envelope_parse() {
        let text = r#"{"patient":{"fields":{"full_name":"Ana Lima","tax_id":52998224725,"email":null},"raw":{"Telefone":"81999990000"}}}"#;
        let envelope = JsonEnvelopeParser.parse_text(text).unwrap();

        let fields = envelope.patient.field_texts();
        assert_eq!(
            fields,
            vec![
                ("full_name".to_string(), "Ana Lima".to_string()),
                ("tax_id".to_string(), "52998224725".to_string()),
            ]
        );
        assert_eq!(envelope.patient.raw_texts().len(), 1);
    }

    #[test]
    fn test_json_envelope_missing_patient_is_error() {
        let result = JsonEnvelopeParser.parse_text(r#"{"fields":{}}"#);
        assert!(matches!(result, Err(ImportError::JsonEnvelopeError(_))));
    }
}
