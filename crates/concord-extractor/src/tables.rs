//! Markdown pipe tables to milestones, rate items and line items

use crate::patterns::normalize_date;
use concord_domain::FieldMap;
use concord_gatekeeper::numeric::{parse_amount_str, parse_percent};
use serde_json::{Map, Number, Value};

/// What a table lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Payment milestones
    Milestones,
    /// Staff rate schedule
    RateItems,
    /// Products and quantities
    LineItems,
}

impl TableKind {
    /// Field name the rows are stored under
    pub fn field_name(&self) -> &'static str {
        match self {
            TableKind::Milestones => "milestones",
            TableKind::RateItems => "rateItems",
            TableKind::LineItems => "lineItems",
        }
    }

    /// Header words that suggest this kind
    fn cues(&self) -> &'static [&'static str] {
        match self {
            TableKind::Milestones => &["里程碑", "阶段", "节点", "比例", "milestone", "%"],
            TableKind::RateItems => &["费率", "岗位", "角色", "人天", "人月", "级别", "role", "rate"],
            TableKind::LineItems => &["产品", "品名", "数量", "货物", "规格", "product", "quantity", "qty"],
        }
    }

    /// Canonical columns with their label words, in claiming order
    fn columns(&self) -> &'static [Column] {
        match self {
            TableKind::Milestones => MILESTONE_COLUMNS,
            TableKind::RateItems => RATE_COLUMNS,
            TableKind::LineItems => LINE_ITEM_COLUMNS,
        }
    }

    /// The column that names each row
    fn name_field(&self) -> &'static str {
        match self {
            TableKind::Milestones => "name",
            TableKind::RateItems => "role",
            TableKind::LineItems => "productName",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Text,
    Amount,
    Percent,
    Date,
}

struct Column {
    field: &'static str,
    labels: &'static [&'static str],
    cell: Cell,
}

impl Column {
    const fn new(field: &'static str, labels: &'static [&'static str], cell: Cell) -> Self {
        Self {
            field,
            labels,
            cell,
        }
    }
}

// The item name comes last so a more specific label claims its column first.
const MILESTONE_COLUMNS: &[Column] = &[
    Column::new("paymentPercentage", &["比例", "百分比", "percentage", "%"], Cell::Percent),
    Column::new("amount", &["金额", "款项", "amount"], Cell::Amount),
    Column::new("plannedDate", &["日期", "时间", "date"], Cell::Date),
    Column::new("name", &["里程碑", "阶段", "节点", "名称", "milestone", "name"], Cell::Text),
];

const RATE_COLUMNS: &[Column] = &[
    Column::new("rate", &["费率", "单价", "价格", "rate", "price"], Cell::Amount),
    Column::new("rateType", &["计费方式", "计费单位", "类型", "单位", "type"], Cell::Text),
    Column::new("role", &["角色", "岗位", "人员", "级别", "role"], Cell::Text),
];

const LINE_ITEM_COLUMNS: &[Column] = &[
    Column::new("quantity", &["数量", "quantity", "qty"], Cell::Amount),
    Column::new("unitPrice", &["单价", "unit price"], Cell::Amount),
    Column::new("subtotal", &["小计", "金额", "总价", "subtotal", "amount"], Cell::Amount),
    Column::new("productName", &["产品", "品名", "名称", "货物", "项目", "product", "item"], Cell::Text),
];

const TOTAL_ROW_MARKERS: &[&str] = &["合计", "总计", "total"];

/// A parsed pipe table: header labels and data rows
#[derive(Debug, Clone, PartialEq)]
pub struct PipeTable {
    /// Header cells
    pub header: Vec<String>,
    /// Data rows, separator excluded
    pub rows: Vec<Vec<String>>,
}

/// Read every pipe table in `text` into tabular fields
///
/// The first table of each kind wins.
pub fn extract_tables(text: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    for table in find_tables(text) {
        let Some(kind) = classify(&table.header) else {
            continue;
        };
        let field = kind.field_name();
        if fields.contains_key(field) {
            continue;
        }
        let rows = table_rows(&table, kind);
        if !rows.is_empty() {
            fields.insert(field.to_string(), Value::Array(rows));
        }
    }
    fields
}

/// Find consecutive pipe rows and infer their header
pub fn find_tables(text: &str) -> Vec<PipeTable> {
    let mut tables = Vec::new();
    let mut block: Vec<Vec<String>> = Vec::new();

    for line in text.lines().chain(std::iter::once("")) {
        let trimmed = line.trim();
        if trimmed.starts_with('|') {
            block.push(split_row(trimmed));
            continue;
        }
        if !block.is_empty() {
            if let Some(table) = infer_header(std::mem::take(&mut block)) {
                tables.push(table);
            }
        }
    }
    tables
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim_start_matches('|');
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|c| c.trim().to_string()).collect()
}

fn is_separator(row: &[String]) -> bool {
    row.iter().all(|cell| {
        let core = cell.trim_matches(':');
        !core.is_empty() && core.chars().all(|c| c == '-')
    })
}

fn is_numeric_cell(cell: &str) -> bool {
    parse_amount_str(cell).is_some() || parse_percent(&Value::String(cell.to_string())).is_some()
}

/// Header is the row above a separator, else a first row that is mostly words
fn infer_header(rows: Vec<Vec<String>>) -> Option<PipeTable> {
    if let Some(sep) = rows.iter().position(|r| is_separator(r)) {
        if sep == 0 {
            return None;
        }
        let header = rows[sep - 1].clone();
        let data = rows
            .into_iter()
            .skip(sep + 1)
            .filter(|r| !is_separator(r))
            .collect();
        return Some(PipeTable { header, rows: data });
    }

    let first = rows.first()?;
    let filled: Vec<&String> = first.iter().filter(|c| !c.is_empty()).collect();
    let words = filled.iter().filter(|c| !is_numeric_cell(c)).count();
    if filled.is_empty() || words * 2 <= filled.len() {
        return None;
    }
    let mut rows = rows.into_iter();
    let header = rows.next()?;
    Some(PipeTable {
        header,
        rows: rows.collect(),
    })
}

/// The kind whose cues match the most header cells (ties in declaration order)
pub fn classify(header: &[String]) -> Option<TableKind> {
    let lowered: Vec<String> = header.iter().map(|h| h.to_lowercase()).collect();
    let mut best: Option<(TableKind, usize)> = None;
    for kind in [TableKind::Milestones, TableKind::RateItems, TableKind::LineItems] {
        let hits = lowered
            .iter()
            .filter(|h| kind.cues().iter().any(|cue| h.contains(cue)))
            .count();
        if hits > 0 && best.map(|(_, b)| hits > b).unwrap_or(true) {
            best = Some((kind, hits));
        }
    }
    best.map(|(kind, _)| kind)
}

/// Map header cells to canonical fields; the name falls back to column 0
fn map_columns(header: &[String], kind: TableKind) -> Vec<Option<&'static Column>> {
    let lowered: Vec<String> = header.iter().map(|h| h.to_lowercase()).collect();
    let mut mapping: Vec<Option<&'static Column>> = vec![None; header.len()];

    for column in kind.columns() {
        let slot = lowered.iter().enumerate().position(|(i, h)| {
            mapping[i].is_none() && column.labels.iter().any(|label| h.contains(label))
        });
        if let Some(i) = slot {
            mapping[i] = Some(column);
        }
    }

    let name_field = kind.name_field();
    let has_name = mapping.iter().flatten().any(|c| c.field == name_field);
    if !has_name && !mapping.is_empty() && mapping[0].is_none() {
        mapping[0] = kind.columns().iter().find(|c| c.field == name_field);
    }
    mapping
}

fn table_rows(table: &PipeTable, kind: TableKind) -> Vec<Value> {
    let mapping = map_columns(&table.header, kind);
    let unit = rate_unit(&table.header);

    table
        .rows
        .iter()
        .filter(|row| !is_total_row(row))
        .filter_map(|row| {
            let mut item = Map::new();
            for (cell, column) in row.iter().zip(&mapping) {
                let Some(column) = column else { continue };
                if let Some(value) = cell_value(cell, column.cell) {
                    item.insert(column.field.to_string(), value);
                }
            }
            if kind == TableKind::RateItems && !item.contains_key("rateType") {
                if let Some(unit) = unit {
                    item.insert("rateType".to_string(), Value::String(unit.to_string()));
                }
            }
            item.contains_key(kind.name_field())
                .then_some(Value::Object(item))
        })
        .collect()
}

fn is_total_row(row: &[String]) -> bool {
    row.iter()
        .take(2)
        .any(|c| TOTAL_ROW_MARKERS.iter().any(|m| c.to_lowercase().contains(m)))
}

/// Billing unit named in a rate header, e.g. `费率（元/人天）`
fn rate_unit(header: &[String]) -> Option<&'static str> {
    ["人天", "人月", "小时"]
        .into_iter()
        .find(|unit| header.iter().any(|h| h.contains(unit)))
}

fn cell_value(cell: &str, kind: Cell) -> Option<Value> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    let parsed = match kind {
        Cell::Text => None,
        Cell::Amount => parse_amount_str(cell).map(number),
        Cell::Percent => parse_percent(&Value::String(cell.to_string())).map(number),
        Cell::Date => normalize_date(cell).map(Value::String),
    };
    Some(parsed.unwrap_or_else(|| Value::String(cell.to_string())))
}

/// Whole numbers become JSON integers
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MILESTONES: &str = "付款安排如下：\n\
| 付款节点 | 付款比例 | 金额（元） | 计划日期 |\n\
| --- | --- | --- | --- |\n\
| 合同签订 | 30% | 150,000 | 2024年1月10日 |\n\
| 上线验收 | 60% | 300,000 | 2024-06-30 |\n\
| 质保期满 | 10% | 50,000 | 2025-06-30 |\n\
| 合计 | 100% | 500,000 | |\n";

    #[test]
    fn test_milestone_table() {
        let fields = extract_tables(MILESTONES);
        let milestones = fields["milestones"].as_array().unwrap();
        assert_eq!(milestones.len(), 3);
        assert_eq!(
            milestones[0],
            json!({"name": "合同签订", "paymentPercentage": 30, "amount": 150000, "plannedDate": "2024-01-10"})
        );
        assert_eq!(milestones[2]["paymentPercentage"], json!(10));
    }

    #[test]
    fn test_rate_table_infers_unit() {
        let text = "| 岗位 | 费率（元/人天） |\n|:---:|---:|\n| 高级工程师 | 2,000 |\n| 项目经理 | 2500.5 |\n";
        let fields = extract_tables(text);
        let rates = fields["rateItems"].as_array().unwrap();
        assert_eq!(
            rates[0],
            json!({"role": "高级工程师", "rate": 2000, "rateType": "人天"})
        );
        assert_eq!(rates[1]["rate"], json!(2500.5));
    }

    #[test]
    fn test_line_items_without_separator() {
        let text = "| 产品 | 数量 | 单价 | 小计 |\n| 服务器 | 2 | 50000 | 100000 |\n| 交换机 | 1 | 8000 | 8000 |\n";
        let fields = extract_tables(text);
        let items = fields["lineItems"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0],
            json!({"productName": "服务器", "quantity": 2, "unitPrice": 50000, "subtotal": 100000})
        );
    }

    #[test]
    fn test_name_falls_back_to_first_column() {
        let text = "| 说明 | 比例 |\n|---|---|\n| 首付款 | 40% |\n";
        let fields = extract_tables(text);
        assert_eq!(
            fields["milestones"],
            json!([{"name": "首付款", "paymentPercentage": 40}])
        );
    }

    #[test]
    fn test_numeric_first_row_is_not_a_header() {
        let text = "| 1 | 2 |\n| 3 | 4 |\n";
        assert!(find_tables(text).is_empty());
        assert!(extract_tables(text).is_empty());
    }

    #[test]
    fn test_unrelated_table_is_ignored() {
        let text = "| 联系人 | 电话 |\n|---|---|\n| 张三 | 123 |\n";
        assert_eq!(find_tables(text).len(), 1);
        assert!(extract_tables(text).is_empty());
    }
}
