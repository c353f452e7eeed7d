//! Field descriptors - the central table of what is extracted and how
//!
//! Host markup drift shows up here and nowhere else: every logical field has
//! one descriptor (locator + parser + validation), so a host redesign turns
//! into a short, enumerable list of failing fields.

use std::time::Duration;

use super::error::{ConfigError, ExtractionFailure, LocatorError};
use super::locator::{Located, Locator, ReadFrom, Selector};
use super::types::{FieldValue, Member};

// Logical field names
pub const ALLIANCE_NAME: &str = "allianceName";
pub const ALLIANCE_TAG: &str = "allianceTag";
pub const MEMBER_COUNT: &str = "memberCount";
pub const RESOURCE_LEVEL: &str = "resourceLevel";
pub const TOTAL_POWER: &str = "totalPower";
pub const EVENT_TIMER: &str = "eventTimer";
pub const ROSTER: &str = "roster";

// =============================================================================
// PARSERS
// =============================================================================

/// A roster column: a selector for captured rows, a key for payload rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowField {
    pub selector: Selector,
    pub key: String,
}

impl RowField {
    pub fn new(selector: &str, key: &str) -> Result<Self, LocatorError> {
        Ok(Self {
            selector: Selector::parse(selector)?,
            key: key.to_string(),
        })
    }

    fn read(&self, row: &Located<'_>) -> Option<String> {
        match row {
            Located::Node(node) => self
                .selector
                .select_first(node)
                .map(|n| n.text_content())
                .filter(|s| !s.is_empty()),
            Located::Value(_) => row.read(&ReadFrom::Attr(self.key.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterSpec {
    pub name: RowField,
    pub rank: Option<RowField>,
    pub power: Option<RowField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldParser {
    Text,
    Integer,
    Duration,
    Roster(RosterSpec),
}

fn unparsable(raw: &str, detail: &str) -> ExtractionFailure {
    ExtractionFailure::Unparsable {
        raw: raw.to_string(),
        detail: detail.to_string(),
    }
}

/// Parse a displayed integer: `12,345`, `12 345`, `1.234.567`, `12.5K`, `3M`
pub fn parse_integer(raw: &str) -> Result<i64, ExtractionFailure> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(unparsable(raw, "empty"));
    }

    let (number, multiplier) = match trimmed.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => (&trimmed[..trimmed.len() - 1], 1_000f64),
        Some('M') => (&trimmed[..trimmed.len() - 1], 1_000_000f64),
        Some('B') => (&trimmed[..trimmed.len() - 1], 1_000_000_000f64),
        _ => (trimmed, 1f64),
    };

    let cleaned: String = number
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}' | '\'' | '_'))
        .collect();

    if multiplier > 1.0 {
        return cleaned
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| (v * multiplier).round() as i64)
            .ok_or_else(|| unparsable(raw, "not a number"));
    }

    if let Ok(value) = cleaned.parse::<i64>() {
        return Ok(value);
    }

    // Dotted thousands grouping: every group after the first has 3 digits
    let mut groups = cleaned.split('.');
    let head = groups.next().unwrap_or_default();
    let tail: Vec<&str> = groups.collect();
    if !tail.is_empty() && tail.iter().all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit())) {
        let joined = format!("{}{}", head, tail.concat());
        if let Ok(value) = joined.parse::<i64>() {
            return Ok(value);
        }
    }

    Err(unparsable(raw, "not a number"))
}

/// Parse a countdown: `02:03:04`, `03:04`, `1d 02:03:04`, `2h 5m 10s`, `45s`
pub fn parse_duration(raw: &str) -> Result<Duration, ExtractionFailure> {
    let mut total: u64 = 0;
    let mut parsed_any = false;

    for token in raw.split_whitespace() {
        if token.contains(':') {
            let parts: Vec<&str> = token.split(':').collect();
            if parts.len() < 2 || parts.len() > 3 {
                return Err(unparsable(raw, "expected MM:SS or HH:MM:SS"));
            }
            let mut secs = 0u64;
            for part in parts {
                let value: u64 = part
                    .parse()
                    .map_err(|_| unparsable(raw, "bad clock component"))?;
                secs = secs
                    .checked_mul(60)
                    .and_then(|s| s.checked_add(value))
                    .ok_or_else(|| unparsable(raw, "duration out of range"))?;
            }
            total = total
                .checked_add(secs)
                .ok_or_else(|| unparsable(raw, "duration out of range"))?;
            parsed_any = true;
            continue;
        }

        let Some(unit) = token.chars().last() else {
            continue;
        };
        let scale = match unit.to_ascii_lowercase() {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => return Err(unparsable(raw, "unknown time unit")),
        };
        let value: u64 = token[..token.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| unparsable(raw, "bad time component"))?;
        total = value
            .checked_mul(scale)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| unparsable(raw, "duration out of range"))?;
        parsed_any = true;
    }

    if parsed_any {
        Ok(Duration::from_secs(total))
    } else {
        Err(unparsable(raw, "empty"))
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    NonEmpty,
    MaxLength(usize),
    Range { min: i64, max: i64 },
}

impl Validator {
    pub fn check(&self, value: &FieldValue) -> Result<(), ExtractionFailure> {
        let invalid = |detail: String| Err(ExtractionFailure::Invalid { detail });
        match (self, value) {
            (Validator::NonEmpty, FieldValue::Text(s)) if s.is_empty() => invalid("empty text".into()),
            (Validator::NonEmpty, FieldValue::Roster(rows)) if rows.is_empty() => {
                invalid("empty roster".into())
            }
            (Validator::MaxLength(max), FieldValue::Text(s)) if s.chars().count() > *max => {
                invalid(format!("longer than {} characters", max))
            }
            (Validator::Range { min, max }, FieldValue::Integer(n)) if n < min || n > max => {
                invalid(format!("{} outside {}..={}", n, min, max))
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// DESCRIPTOR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub locator: Locator,
    pub read: ReadFrom,
    pub parser: FieldParser,
    pub validators: Vec<Validator>,
    pub required: bool,
}

impl FieldDescriptor {
    pub fn new(name: &str, locator: &str, parser: FieldParser) -> Result<Self, LocatorError> {
        Ok(Self {
            name: name.to_string(),
            locator: Locator::parse(locator)?,
            read: ReadFrom::Text,
            parser,
            validators: Vec::new(),
            required: false,
        })
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Parse and validate this field from a set of located values
    pub fn parse(&self, located: &[Located<'_>]) -> Result<FieldValue, ExtractionFailure> {
        let value = match &self.parser {
            FieldParser::Roster(spec) => FieldValue::Roster(parse_roster(spec, located)?),
            FieldParser::Text => {
                let raw = self.first_raw(located)?;
                FieldValue::Text(raw.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            FieldParser::Integer => FieldValue::Integer(parse_integer(&self.first_raw(located)?)?),
            FieldParser::Duration => FieldValue::Duration(parse_duration(&self.first_raw(located)?)?),
        };

        for validator in &self.validators {
            validator.check(&value)?;
        }
        Ok(value)
    }

    fn first_raw(&self, located: &[Located<'_>]) -> Result<String, ExtractionFailure> {
        located
            .first()
            .and_then(|found| found.read(&self.read))
            .ok_or(ExtractionFailure::NotFound)
    }
}

fn parse_roster(spec: &RosterSpec, rows: &[Located<'_>]) -> Result<Vec<Member>, ExtractionFailure> {
    if rows.is_empty() {
        return Err(ExtractionFailure::NotFound);
    }
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let name = spec.name.read(row).ok_or_else(|| ExtractionFailure::Invalid {
                detail: format!("roster row {} has no name", i),
            })?;
            let rank = spec.rank.as_ref().and_then(|f| f.read(row));
            let power = match spec.power.as_ref().and_then(|f| f.read(row)) {
                Some(raw) => Some(parse_integer(&raw)?),
                None => None,
            };
            Ok(Member { name, rank, power })
        })
        .collect()
}

// =============================================================================
// DEFAULT TABLE
// =============================================================================

/// The alliance field table used unless configuration overrides it
pub fn alliance_fields() -> Result<Vec<FieldDescriptor>, LocatorError> {
    Ok(vec![
        FieldDescriptor::new(
            ALLIANCE_NAME,
            "[data-alliance-name] || .alliance-header .alliance-name || #alliance-name",
            FieldParser::Text,
        )?
        .required()
        .validate(Validator::NonEmpty)
        .validate(Validator::MaxLength(64)),
        FieldDescriptor::new(
            ALLIANCE_TAG,
            "[data-alliance-tag] || .alliance-header .alliance-tag",
            FieldParser::Text,
        )?
        .validate(Validator::MaxLength(8)),
        FieldDescriptor::new(
            MEMBER_COUNT,
            "[data-member-count] || .alliance-members .count",
            FieldParser::Integer,
        )?
        .required()
        .validate(Validator::Range { min: 0, max: 500 }),
        FieldDescriptor::new(
            RESOURCE_LEVEL,
            "[data-resource-level] || .alliance-resources .level",
            FieldParser::Integer,
        )?
        .required()
        .validate(Validator::Range {
            min: 0,
            max: 1_000_000_000_000,
        }),
        FieldDescriptor::new(
            TOTAL_POWER,
            "[data-alliance-power] || .alliance-power .value",
            FieldParser::Integer,
        )?
        .validate(Validator::Range { min: 0, max: i64::MAX }),
        FieldDescriptor::new(
            EVENT_TIMER,
            "[data-event-timer] || .alliance-event .timer",
            FieldParser::Duration,
        )?,
        FieldDescriptor::new(
            ROSTER,
            ".member-list .member-row || [data-member-id]",
            FieldParser::Roster(RosterSpec {
                name: RowField::new(".member-name", "name")?,
                rank: Some(RowField::new(".member-rank", "rank")?),
                power: Some(RowField::new(".member-power", "power")?),
            }),
        )?,
    ])
}

/// Configuration override for one descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldOverride {
    pub name: String,
    #[serde(default)]
    pub locator: Option<String>,
    /// Read this attribute instead of the text content
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
}

/// Apply overrides to a table. Runs once at start-up.
pub fn apply_overrides(
    mut fields: Vec<FieldDescriptor>,
    overrides: &[FieldOverride],
) -> Result<Vec<FieldDescriptor>, ConfigError> {
    for ov in overrides {
        let field = fields
            .iter_mut()
            .find(|f| f.name == ov.name)
            .ok_or_else(|| ConfigError::UnknownField(ov.name.clone()))?;
        if let Some(locator) = &ov.locator {
            field.locator = Locator::parse(locator).map_err(|source| ConfigError::Locator {
                field: ov.name.clone(),
                source,
            })?;
        }
        if let Some(attribute) = &ov.attribute {
            field.read = ReadFrom::Attr(attribute.clone());
        }
        if let Some(required) = ov.required {
            field.required = required;
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::HostNode;

    #[test]
    fn test_parse_integer_plain_and_grouped() {
        assert_eq!(parse_integer("42"), Ok(42));
        assert_eq!(parse_integer(" 12,345 "), Ok(12_345));
        assert_eq!(parse_integer("12 345"), Ok(12_345));
        assert_eq!(parse_integer("12\u{a0}345"), Ok(12_345));
        assert_eq!(parse_integer("1.234.567"), Ok(1_234_567));
        assert_eq!(parse_integer("-7"), Ok(-7));
    }

    #[test]
    fn test_parse_integer_suffixes() {
        assert_eq!(parse_integer("12.5K"), Ok(12_500));
        assert_eq!(parse_integer("3m"), Ok(3_000_000));
        assert_eq!(parse_integer("1.2B"), Ok(1_200_000_000));
    }

    #[test]
    fn test_parse_integer_rejects_garbage() {
        assert!(matches!(parse_integer(""), Err(ExtractionFailure::Unparsable { .. })));
        assert!(matches!(parse_integer("abc"), Err(ExtractionFailure::Unparsable { .. })));
        assert!(matches!(parse_integer("1.23"), Err(ExtractionFailure::Unparsable { .. })));
        assert!(matches!(parse_integer("K"), Err(ExtractionFailure::Unparsable { .. })));
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration("02:03:04"), Ok(Duration::from_secs(7384)));
        assert_eq!(parse_duration("03:04"), Ok(Duration::from_secs(184)));
        assert_eq!(parse_duration("1d 02:03:04"), Ok(Duration::from_secs(86_400 + 7384)));
        assert_eq!(parse_duration("2h 5m 10s"), Ok(Duration::from_secs(7510)));
        assert_eq!(parse_duration("45s"), Ok(Duration::from_secs(45)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("1:2:3:4").is_err());
        assert!(parse_duration("xh").is_err());
    }

    #[test]
    fn test_parse_duration_out_of_range() {
        for raw in ["999999999999999d", "9999999999999999999:00", "18446744073709551615s 1s"] {
            assert!(
                matches!(parse_duration(raw), Err(ExtractionFailure::Unparsable { ref detail, .. }) if detail == "duration out of range"),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_validators() {
        assert!(Validator::NonEmpty.check(&FieldValue::Text(String::new())).is_err());
        assert!(Validator::NonEmpty.check(&FieldValue::Text("x".into())).is_ok());
        assert!(Validator::MaxLength(3).check(&FieldValue::Text("abcd".into())).is_err());
        let range = Validator::Range { min: 0, max: 10 };
        assert!(range.check(&FieldValue::Integer(11)).is_err());
        assert!(range.check(&FieldValue::Integer(-1)).is_err());
        assert!(range.check(&FieldValue::Integer(10)).is_ok());
        // Validators ignore values of other types
        assert!(range.check(&FieldValue::Text("x".into())).is_ok());
    }

    #[test]
    fn test_roster_rows_from_nodes() {
        let row = |name: &str, rank: &str, power: &str| {
            HostNode::element("li")
                .with_class("member-row")
                .with_child(HostNode::element("span").with_class("member-name").with_text(name))
                .with_child(HostNode::element("span").with_class("member-rank").with_text(rank))
                .with_child(HostNode::element("span").with_class("member-power").with_text(power))
        };
        let rows = [row("Ana", "R5", "1.2M"), row("Bo", "R4", "850,000")];
        let located: Vec<Located<'_>> = rows.iter().map(Located::Node).collect();

        let table = alliance_fields().unwrap();
        let roster = table.iter().find(|f| f.name == ROSTER).unwrap();
        let value = roster.parse(&located).unwrap();
        let members = value.as_roster().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, "Ana");
        assert_eq!(members[0].rank.as_deref(), Some("R5"));
        assert_eq!(members[0].power, Some(1_200_000));
        assert_eq!(members[1].power, Some(850_000));
    }

    #[test]
    fn test_roster_row_without_name_is_invalid() {
        let rows = [HostNode::element("li").with_class("member-row")];
        let located: Vec<Located<'_>> = rows.iter().map(Located::Node).collect();
        let table = alliance_fields().unwrap();
        let roster = table.iter().find(|f| f.name == ROSTER).unwrap();
        assert!(matches!(roster.parse(&located), Err(ExtractionFailure::Invalid { .. })));
    }

    #[test]
    fn test_default_table_names_are_unique() {
        let table = alliance_fields().unwrap();
        let mut names: Vec<&str> = table.iter().map(|f| f.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), table.len());
    }

    #[test]
    fn test_apply_overrides() {
        let overrides = vec![FieldOverride {
            name: RESOURCE_LEVEL.to_string(),
            locator: Some("payload:alliance:/resources".to_string()),
            attribute: None,
            required: Some(false),
        }];
        let table = apply_overrides(alliance_fields().unwrap(), &overrides).unwrap();
        let field = table.iter().find(|f| f.name == RESOURCE_LEVEL).unwrap();
        assert!(!field.required);
        assert!(matches!(field.locator, Locator::Payload { .. }));
    }

    #[test]
    fn test_apply_overrides_rejects_unknown_field_and_bad_locator() {
        let unknown = vec![FieldOverride {
            name: "nope".to_string(),
            ..Default::default()
        }];
        assert!(matches!(
            apply_overrides(alliance_fields().unwrap(), &unknown),
            Err(ConfigError::UnknownField(_))
        ));

        let bad = vec![FieldOverride {
            name: MEMBER_COUNT.to_string(),
            locator: Some("div >".to_string()),
            ..Default::default()
        }];
        assert!(matches!(
            apply_overrides(alliance_fields().unwrap(), &bad),
            Err(ConfigError::Locator { .. })
        ));
    }
}
