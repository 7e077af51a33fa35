//! Labeled regular expressions and value normalizers
//!
//! The table here is what the pattern-match strategy applies to raw text and
//! what the retrieval strategy applies to retrieved chunks.

use crate::tables;
use chrono::NaiveDate;
use concord_domain::{is_filled, FieldMap};
use concord_gatekeeper::numeric::{parse_amount_str, parse_percent};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// How a captured value is cleaned before it becomes a field value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Normalizer {
    /// Trim whitespace and trailing punctuation
    Text,
    /// Strip currency noise, expand `万`, keep digits
    Amount,
    /// Percentage to fraction
    Percent,
    /// Any `年月日` or separated date to `YYYY-MM-DD`
    Date,
}

struct FieldPattern {
    field: &'static str,
    regex: Regex,
    normalizer: Normalizer,
}

const AMOUNT: &str = r"((?:人民币|RMB|CNY|USD|¥|￥|\$)?[ \t]*\d[\d,，]*(?:\.\d+)?[ \t]*万?[ \t]*元?)";
const DATE: &str = r"(\d{4}[ \t]*[-/.年][ \t]*\d{1,2}[ \t]*[-/.月][ \t]*\d{1,2}[ \t]*日?)";

fn pattern(field: &'static str, regex: &str, normalizer: Normalizer) -> FieldPattern {
    FieldPattern {
        field,
        regex: Regex::new(regex).unwrap(),
        normalizer,
    }
}

static FIELD_PATTERNS: Lazy<Vec<FieldPattern>> = Lazy::new(|| {
    use Normalizer::*;
    vec![
        pattern(
            "contractNo",
            r"(?i)(?:合同编号|合同号|协议编号|contract[ \t]*no\.?)[ \t]*[：:][ \t]*([A-Za-z0-9][A-Za-z0-9\-_/]*)",
            Text,
        ),
        pattern("name", r"(?:合同名称|项目名称)[ \t]*[：:][ \t]*([^\n，,；;]+)", Text),
        pattern(
            "customerName",
            r"(?:甲方|委托方|买方|发包方)(?:[（(][^）)\n]*[）)])?[ \t]*[：:][ \t]*([^\n，,；;（(]+)",
            Text,
        ),
        pattern(
            "ourEntity",
            r"(?:乙方|受托方|卖方|承包方)(?:[（(][^）)\n]*[）)])?[ \t]*[：:][ \t]*([^\n，,；;（(]+)",
            Text,
        ),
        pattern(
            "amountWithTax",
            &format!(r"(?:合同总价|含税总价|含税金额|合同金额|总金额|总价)[ \t]*[：:为]?[ \t]*{}", AMOUNT),
            Amount,
        ),
        pattern(
            "amountWithoutTax",
            &format!(r"(?:不含税金额|不含税总价|不含税价款|未税金额)[ \t]*[：:为]?[ \t]*{}", AMOUNT),
            Amount,
        ),
        pattern(
            "taxRate",
            r"税率[ \t]*[：:为]?[ \t]*(\d+(?:\.\d+)?[ \t]*[%％]|0?\.\d+)",
            Percent,
        ),
        pattern("currency", r"(?:币种|货币)[ \t]*[：:][ \t]*([^\n，,；;]+)", Text),
        pattern(
            "paymentMethod",
            r"(?:付款方式|支付方式|结算方式)[ \t]*[：:][ \t]*([^\n]+)",
            Text,
        ),
        pattern(
            "signDate",
            &format!(r"(?:签订日期|签署日期|签约日期|签订时间)[ \t]*[：:][ \t]*{}", DATE),
            Date,
        ),
        pattern(
            "startDate",
            &format!(r"(?:开始日期|起始日期|生效日期)[ \t]*[：:][ \t]*{}", DATE),
            Date,
        ),
        pattern(
            "endDate",
            &format!(r"(?:结束日期|终止日期|截止日期|到期日)[ \t]*[：:][ \t]*{}", DATE),
            Date,
        ),
        pattern(
            "duration",
            r"(?:合同期限|服务期限|有效期)[ \t]*[：:为]?[ \t]*(\d+[ \t]*(?:个月|月|年|天|日|周))",
            Text,
        ),
        pattern("penaltyClause", r"(违约金[^\n]*)", Text),
        pattern(
            "liabilityLimit",
            r"((?:责任上限|赔偿上限|责任限额|赔偿总额不超过)[^\n]*)",
            Text,
        ),
        pattern(
            "terminationClause",
            r"((?:解除本合同|终止本合同|提前终止|合同解除)[^\n]*)",
            Text,
        ),
        pattern(
            "disputeResolution",
            r"((?:争议解决|提交仲裁|仲裁委员会|向[^\n，,。]{0,20}人民法院)[^\n]*)",
            Text,
        ),
    ]
});

static DATE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"自[ \t]*{}[ \t]*(?:起)?[ \t]*至[ \t]*{}", DATE, DATE)).unwrap()
});

static DATE_PARTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[ \t]*[-/.年][ \t]*(\d{1,2})[ \t]*[-/.月][ \t]*(\d{1,2})").unwrap());

/// Apply every labeled pattern and the table reader to `text`
///
/// The first usable match per field wins. Tabular fields come from markdown
/// pipe tables. Unfilled values are never returned.
///
/// # Examples
///
/// ```
/// use concord_extractor::patterns::extract_fields;
///
/// let fields = extract_fields("合同编号：CT-001\n总价：人民币500,000元，税率6%\n");
/// assert_eq!(fields["contractNo"], "CT-001");
/// assert_eq!(fields["amountWithTax"], "500000");
/// assert_eq!(fields["taxRate"], "0.06");
/// assert_eq!(fields["currency"], "CNY");
/// ```
pub fn extract_fields(text: &str) -> FieldMap {
    let mut fields = FieldMap::new();

    for pattern in FIELD_PATTERNS.iter() {
        let found = pattern.regex.captures_iter(text).find_map(|caps| {
            let whole = caps.get(0)?;
            if pattern.normalizer == Normalizer::Amount && negated(text, whole.start()) {
                return None;
            }
            normalize(caps.get(1)?.as_str(), pattern.normalizer)
        });
        if let Some(value) = found {
            fields.insert(pattern.field.to_string(), Value::String(value));
        }
    }

    if let Some(caps) = DATE_RANGE.captures(text) {
        for (field, group) in [("startDate", 1), ("endDate", 2)] {
            if fields.contains_key(field) {
                continue;
            }
            if let Some(date) = caps.get(group).and_then(|m| normalize_date(m.as_str())) {
                fields.insert(field.to_string(), Value::String(date));
            }
        }
    }

    if !fields.contains_key("currency") {
        if let Some(currency) = detect_currency(text) {
            fields.insert("currency".to_string(), Value::String(currency.to_string()));
        }
    } else if let Some(Value::String(raw)) = fields.get("currency") {
        if let Some(code) = detect_currency(raw) {
            fields.insert("currency".to_string(), Value::String(code.to_string()));
        }
    }

    for (field, value) in tables::extract_tables(text) {
        fields.entry(field).or_insert(value);
    }

    fields.retain(|_, v| is_filled(v));
    fields
}

/// A with-tax label preceded by 不 or 未 is really the without-tax amount
fn negated(text: &str, match_start: usize) -> bool {
    text[..match_start]
        .chars()
        .next_back()
        .map(|c| c == '不' || c == '未')
        .unwrap_or(false)
}

fn normalize(raw: &str, normalizer: Normalizer) -> Option<String> {
    match normalizer {
        Normalizer::Text => normalize_text(raw),
        Normalizer::Amount => normalize_amount(raw),
        Normalizer::Percent => normalize_percent(raw),
        Normalizer::Date => normalize_date(raw),
    }
}

fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_end_matches(['，', ',', '。', '；', ';', '：', ':'])
        .trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `人民币500,000元` → `"500000"`, `50万` → `"500000"`
pub fn normalize_amount(raw: &str) -> Option<String> {
    parse_amount_str(raw).map(format_number)
}

/// `6%` → `"0.06"`; bare fractions are kept as fractions
pub fn normalize_percent(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let points = parse_percent(&Value::String(trimmed.to_string()))?;
    let is_percent = trimmed.ends_with('%') || trimmed.ends_with('％');
    let fraction = if is_percent || points > 1.0 {
        points / 100.0
    } else {
        points
    };
    Some(format_number(fraction))
}

/// `2024年1月5日`, `2024/1/5` and `2024.01.05` all become `2024-01-05`
pub fn normalize_date(raw: &str) -> Option<String> {
    let caps = DATE_PARTS.captures(raw)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Whole numbers print without a fractional part
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn detect_currency(text: &str) -> Option<&'static str> {
    const CNY: &[&str] = &["人民币", "RMB", "CNY", "¥", "￥"];
    const USD: &[&str] = &["美元", "USD", "US$"];
    let cny = CNY.iter().filter_map(|m| text.find(m)).min();
    let usd = USD.iter().filter_map(|m| text.find(m)).min();
    match (cny, usd) {
        (Some(c), Some(u)) => Some(if c <= u { "CNY" } else { "USD" }),
        (Some(_), None) => Some("CNY"),
        (None, Some(_)) => Some("USD"),
        (None, None) => None,
    }
}
