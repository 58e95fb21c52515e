// ==========================================
// 批量导入管线 - 源数据读取器
// ==========================================
// 支持: Excel (.xlsx/.xls，首个工作表) / CSV (.csv)
// 输出: 元素编号（从 0 起，按文件顺序）→ 元素
// ==========================================

use crate::domain::element::{Element, ElementMap};
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use serde_json::Value;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

// ==========================================
// SourceReader Trait
// ==========================================
// 用途: 管线读取阶段的外部数据来源
// 实现者: CsvSourceReader / ExcelSourceReader / FileSourceReader
pub trait SourceReader {
    fn read_source_data(&self) -> ImportResult<ElementMap>;
}

/// 由表头与一行单元格组装元素；整行空白返回 None
fn build_element(headers: &[String], cells: impl Iterator<Item = String>) -> Option<Element> {
    let mut element = Element::new();
    for (header, value) in headers.iter().zip(cells) {
        if header.is_empty() {
            continue;
        }
        element.insert(header.clone(), Value::String(value.trim().to_string()));
    }

    let blank = element
        .values()
        .all(|v| v.as_str().map_or(true, str::is_empty));
    if blank {
        None
    } else {
        Some(element)
    }
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(ImportError::FileNotFound(path.display().to_string()))
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ==========================================
// CSV Reader 实现
// ==========================================
pub struct CsvSourceReader {
    path: PathBuf,
}

impl CsvSourceReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceReader for CsvSourceReader {
    fn read_source_data(&self) -> ImportResult<ElementMap> {
        ensure_exists(&self.path)?;

        let ext = extension_of(&self.path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(&self.path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut elements = ElementMap::new();
        for result in reader.records() {
            let record = result?;
            if let Some(element) = build_element(&headers, record.iter().map(str::to_string)) {
                elements.insert(elements.len(), element);
            }
        }

        debug!(path = %self.path.display(), count = elements.len(), "CSV 读取完成");
        Ok(elements)
    }
}

// ==========================================
// Excel Reader 实现
// ==========================================
pub struct ExcelSourceReader {
    path: PathBuf,
}

impl ExcelSourceReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceReader for ExcelSourceReader {
    fn read_source_data(&self) -> ImportResult<ElementMap> {
        ensure_exists(&self.path)?;

        let ext = extension_of(&self.path);
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(&self.path)?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParse("Excel 文件无工作表".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        let mut rows = range.rows();
        let Some(header_row) = rows.next() else {
            return Ok(ElementMap::new());
        };

        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        let mut elements = ElementMap::new();
        for row in rows {
            if let Some(element) = build_element(&headers, row.iter().map(|c| c.to_string())) {
                elements.insert(elements.len(), element);
            }
        }

        debug!(path = %self.path.display(), sheet = %sheet_name, count = elements.len(), "Excel 读取完成");
        Ok(elements)
    }
}

// ==========================================
// 通用文件读取器（根据扩展名自动选择）
// ==========================================
pub struct FileSourceReader {
    path: PathBuf,
}

impl FileSourceReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceReader for FileSourceReader {
    fn read_source_data(&self) -> ImportResult<ElementMap> {
        match extension_of(&self.path).as_str() {
            "csv" => CsvSourceReader::new(self.path.clone()).read_source_data(),
            "xlsx" | "xls" => ExcelSourceReader::new(self.path.clone()).read_source_data(),
            other => {
                ensure_exists(&self.path)?;
                Err(ImportError::UnsupportedFormat(other.to_string()))
            }
        }
    }
}
