//! Value grammar of query parameters: `,` (OR) and `;` (AND) separated lists,
//! `key<op>value` expressions, and grouped `prefix:key<op>value` filters.

use std::sync::OnceLock;

use super::Error;

/// Combination operator of a list of values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, strum::Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum QueryOperation {
    And,
    Or,
}

impl QueryOperation {
    pub fn separator(&self) -> char {
        match self {
            QueryOperation::And => ';',
            QueryOperation::Or => ',',
        }
    }
}

/// Comparison operator of a `key<op>value` expression.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum FilterOp {
    #[strum(to_string = "=", serialize = "==")]
    #[serde(rename = "=")]
    Eq,
    #[strum(serialize = "!=")]
    #[serde(rename = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    #[serde(rename = "<")]
    Lt,
    #[strum(serialize = "<=")]
    #[serde(rename = "<=")]
    Le,
    #[strum(serialize = ">")]
    #[serde(rename = ">")]
    Gt,
    #[strum(serialize = ">=")]
    #[serde(rename = ">=")]
    Ge,
    /// "Lower than", also matching missing values.
    #[strum(serialize = "<<")]
    #[serde(rename = "<<")]
    LtLt,
    /// "Greater than", also matching missing values.
    #[strum(serialize = ">>")]
    #[serde(rename = ">>")]
    GtGt,
}

/// A list of values with an optional combination operator.
///
/// The operator is `None` if the list has zero or one element.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Values<T> {
    pub operation: Option<QueryOperation>,
    pub values: Vec<T>,
}

impl<T> Default for Values<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Values<T> {
    pub fn new(operation: Option<QueryOperation>, values: Vec<T>) -> Self {
        Self { operation, values }
    }

    pub fn empty() -> Self {
        Self {
            operation: None,
            values: Vec::new(),
        }
    }

    pub fn single(value: T) -> Self {
        Self {
            operation: None,
            values: vec![value],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Values<U> {
        Values {
            operation: self.operation,
            values: self.values.iter().map(f).collect(),
        }
    }

    /// Keep only values matching `pred`; the operator is kept while more than one
    /// value remains.
    pub fn filter<F: FnMut(&T) -> bool>(&self, mut pred: F) -> Values<T>
    where
        T: Clone,
    {
        let values = self
            .values
            .iter()
            .filter(|v| pred(v))
            .cloned()
            .collect::<Vec<_>>();
        let operation = if values.len() > 1 {
            self.operation
        } else {
            None
        };
        Values { operation, values }
    }
}

impl Values<String> {
    /// Join the values with the separator of the operator.
    pub fn to_query_string(&self) -> String {
        let sep = self.operation.unwrap_or(QueryOperation::Or).separator();
        self.values.join(&sep.to_string())
    }
}

impl<'a, T> IntoIterator for &'a Values<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Whether the value is negated with a leading `!`.
pub fn is_negated(value: &str) -> bool {
    value.starts_with('!')
}

/// Strip a leading `!`, if any.
pub fn remove_negation(value: &str) -> &str {
    value.strip_prefix('!').unwrap_or(value)
}

/// Detect the operator of a list value.
///
/// # Errors
///
/// Returns `Error::MixedOperators` if both separators occur.
pub fn check_operator(param: &str, value: &str) -> Result<Option<QueryOperation>, Error> {
    let and = value.contains(QueryOperation::And.separator());
    let or = value.contains(QueryOperation::Or.separator());
    match (and, or) {
        (true, true) => Err(Error::MixedOperators {
            param: param.to_string(),
            value: value.to_string(),
        }),
        (true, false) => Ok(Some(QueryOperation::And)),
        (false, true) => Ok(Some(QueryOperation::Or)),
        (false, false) => Ok(None),
    }
}

/// Split a list value by its operator.
pub fn split_value(param: &str, value: &str) -> Result<Values<String>, Error> {
    let operation = check_operator(param, value)?;
    let values = match operation {
        Some(op) => value
            .split(op.separator())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        None if value.trim().is_empty() => Vec::new(),
        None => vec![value.trim().to_string()],
    };
    Ok(Values { operation, values })
}

/// A `key<op>value` expression.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeyOpValue {
    pub key: String,
    pub op: FilterOp,
    pub value: String,
}

impl std::fmt::Display for KeyOpValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.key, self.op, self.value)
    }
}

fn key_op_value_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^([^=<>!~,;]+?)(<<|>>|<=|>=|!=|==|=|<|>)([^<>]*)$")
            .expect("invalid key-op-value regex")
    })
}

fn op_value_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^(<<|>>|<=|>=|!=|==|=|<|>)?([^<>=!]*)$")
            .expect("invalid op-value regex")
    })
}

/// Parse a `key<op>value` expression, e.g. `DP>10` or `STUDY:ALL<0.01`.
pub fn parse_key_op_value(value: &str) -> Result<KeyOpValue, Error> {
    let caps = key_op_value_regex()
        .captures(value.trim())
        .ok_or_else(|| Error::InvalidKeyOpValue(value.to_string()))?;
    let op = caps[2]
        .parse::<FilterOp>()
        .map_err(|_| Error::InvalidKeyOpValue(value.to_string()))?;
    Ok(KeyOpValue {
        key: caps[1].trim().to_string(),
        op,
        value: caps[3].trim().to_string(),
    })
}

/// Parse an `<op>value` expression where the operator defaults to `=`, e.g. `>30`.
pub fn parse_op_value(value: &str) -> Result<(FilterOp, String), Error> {
    let caps = op_value_regex()
        .captures(value.trim())
        .ok_or_else(|| Error::InvalidKeyOpValue(value.to_string()))?;
    let op = match caps.get(1) {
        Some(m) => m
            .as_str()
            .parse::<FilterOp>()
            .map_err(|_| Error::InvalidKeyOpValue(value.to_string()))?,
        None => FilterOp::Eq,
    };
    Ok((op, caps[2].trim().to_string()))
}

/// A group of filters sharing a prefix, e.g. all filters of one file in
/// `fileA:DP>10;FILTER=PASS`. Filters in a group are ANDed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct KeyValues {
    pub key: Option<String>,
    pub values: Vec<KeyOpValue>,
}

impl KeyValues {
    pub fn to_query_string(&self) -> String {
        let filters = self
            .values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(";");
        match &self.key {
            Some(key) => format!("{}:{}", key, filters),
            None => filters,
        }
    }
}

/// Parsed `fileData`/`sampleData` value: groups combined with an operator.
pub type ParsedKeyValues = Values<KeyValues>;

impl Values<KeyValues> {
    /// Group with the given key.
    pub fn get_group(&self, key: &str) -> Option<&KeyValues> {
        self.values.iter().find(|kv| kv.key.as_deref() == Some(key))
    }

    pub fn keys(&self) -> Vec<Option<String>> {
        self.values.iter().map(|kv| kv.key.clone()).collect()
    }

    pub fn to_query_string(&self) -> String {
        let sep = self.operation.unwrap_or(QueryOperation::And).separator();
        self.values
            .iter()
            .map(KeyValues::to_query_string)
            .collect::<Vec<_>>()
            .join(&sep.to_string())
    }
}

/// Split `value` into tokens, each with the separator that preceded it.
fn tokenize(value: &str) -> Vec<(Option<char>, &str)> {
    let mut result = Vec::new();
    let mut sep = None;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        if c == ',' || c == ';' {
            result.push((sep, &value[start..i]));
            sep = Some(c);
            start = i + 1;
        }
    }
    result.push((sep, &value[start..]));
    result
}

/// Split a token into a group prefix and the rest, if it has one.
fn split_prefix(token: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = token.split_once(':')?;
    if prefix.is_empty() || prefix.contains(['=', '<', '>', '!']) {
        return None;
    }
    parse_key_op_value(rest).ok().map(|_| (prefix, rest))
}

/// Parse a grouped key-values filter such as
/// `fileA:DP>10;FILTER=PASS,LowGQ;fileB:DP>20`.
///
/// A `prefix:` token opens a new group; the separator in front of it is the
/// operator between groups. A token with an operator adds a filter to the
/// current group. A token without operator extends the value list of the
/// previous filter, keeping its separator.
pub fn parse_key_values(param: &str, value: &str) -> Result<ParsedKeyValues, Error> {
    let mut groups: Vec<KeyValues> = Vec::new();
    let mut operation: Option<QueryOperation> = None;

    for (sep, token) in tokenize(value) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if let Some((prefix, rest)) = split_prefix(token) {
            if !groups.is_empty() {
                let op = match sep {
                    Some(';') => QueryOperation::And,
                    _ => QueryOperation::Or,
                };
                match operation {
                    Some(prev) if prev != op => {
                        return Err(Error::MixedOperators {
                            param: param.to_string(),
                            value: value.to_string(),
                        })
                    }
                    _ => operation = Some(op),
                }
            }
            groups.push(KeyValues {
                key: Some(prefix.to_string()),
                values: vec![parse_key_op_value(rest)?],
            });
        } else if let Ok(kov) = parse_key_op_value(token) {
            match groups.last_mut() {
                Some(group) => group.values.push(kov),
                None => groups.push(KeyValues {
                    key: None,
                    values: vec![kov],
                }),
            }
        } else {
            let last = groups
                .last_mut()
                .and_then(|group| group.values.last_mut())
                .ok_or_else(|| Error::InvalidKeyValues(value.to_string()))?;
            last.value.push(sep.unwrap_or(','));
            last.value.push_str(token);
        }
    }

    Ok(Values {
        operation,
        values: groups,
    })
}
