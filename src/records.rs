//! Columnar record containers for accumulating experiment metrics.
//!
//! The training loop and the cross-validation driver both funnel their
//! per-batch and per-fold measurements through the same structure: an
//! insertion-ordered mapping from a metric name to a growable column of
//! values. [`RecordLog`] is the mutable aggregator; [`RecordTable`] is
//! its frozen snapshot, with each column lowered to a typed vector when
//! the elements permit it.
//!
//! # Access forms
//!
//! Three read-access forms are supported by both containers:
//!
//! - [`RecordLog::get`] — one key, the full column
//! - [`RecordLog::get_many`] — several keys; a single-key selection
//!   yields the bare column rather than a one-element collection (a
//!   deliberate asymmetry, see [`Selected`])
//! - [`RecordLog::get_at`] / [`RecordLog::get_many_at`] — the element at
//!   one position within the resolved column(s)
//!
//! # Example
//!
//! ```rust
//! use facefold_rs::records::{RecordLog, Value};
//!
//! let mut log = RecordLog::new();
//! log.append("loss", 0.5);
//! log.append("loss", 0.25);
//! log.extend("acc", vec![Value::from(0.9), Value::from(0.95)])?;
//!
//! assert_eq!(log.get("loss")?.len(), 2);
//!
//! let frozen = log.freeze();
//! assert_eq!(frozen.get("acc")?.as_f64(), Some(&[0.9, 0.95][..]));
//! # Ok::<(), facefold_rs::HarnessError>(())
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{HarnessError, Result};

/// A single cell value in a record column.
///
/// Columns are heterogeneous by design: a training hook may push floats
/// next to integers or nested sequences. The scalar/sequence split is
/// explicit here, so operations that care about it ([`RecordLog::add`],
/// [`RecordLog::extend`]) dispatch on the variant instead of probing the
/// value at runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// A floating-point scalar.
    Float(f64),
    /// An integer scalar.
    Int(i64),
    /// A boolean scalar.
    Bool(bool),
    /// A text scalar. Text does not iterate; `add` appends it whole.
    Text(String),
    /// A sequence of values.
    Seq(Vec<Value>),
}

impl Value {
    /// Builds a sequence value from anything convertible to cells.
    pub fn seq<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }

    /// Returns true for the `Seq` variant.
    #[must_use]
    pub fn is_seq(&self) -> bool {
        matches!(self, Value::Seq(_))
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Float(_) => "float",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::Seq(_) => "seq",
        }
    }

    /// Returns the float content, widening integers.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the sequence content, if any.
    #[must_use]
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<usize> for Value {
    #[allow(clippy::cast_possible_wrap)]
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Seq(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Seq(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// The result of a multi-key selection.
///
/// Selecting exactly one key yields the bare value, not a one-element
/// collection; selecting any other number yields the collection. This
/// mirrors the aggregator's historical return-shape rule and is kept
/// for compatibility with call sites that destructure by key count.
#[derive(Debug, Clone, PartialEq)]
pub enum Selected<T> {
    /// Exactly one key was selected.
    One(T),
    /// Zero, or two or more, keys were selected.
    Many(Vec<T>),
}

impl<T> Selected<T> {
    /// Number of selected items.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Selected::One(_) => 1,
            Selected::Many(items) => items.len(),
        }
    }

    /// True when nothing was selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unwraps a single-key selection.
    #[must_use]
    pub fn into_one(self) -> Option<T> {
        match self {
            Selected::One(item) => Some(item),
            Selected::Many(_) => None,
        }
    }

    /// Flattens either shape into a vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Selected::One(item) => vec![item],
            Selected::Many(items) => items,
        }
    }
}

/// How [`RecordLog::merge`] joins each source column in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Push the whole source column as one sequence element.
    Append,
    /// Dispatch per value: sequences are flattened in, scalars appended.
    Add,
}

/// Mutable columnar aggregator.
///
/// Grows monotonically: columns are auto-created on first use and never
/// shrink. There is no close/seal state — [`RecordLog::freeze`] is a
/// pure projection that leaves the log open for further growth.
///
/// Not designed for concurrent mutation; parallel fold workers should
/// each keep their own log and merge afterwards.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RecordLog {
    columns: IndexMap<String, Vec<Value>>,
}

impl RecordLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log from initial columns.
    ///
    /// The log owns its storage outright; the caller keeps no handle to
    /// the moved-in columns, so later mutation of caller-side data
    /// cannot alias the log.
    pub fn from_columns<K, I>(columns: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Vec<Value>)>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(key, values)| (key.into(), values))
                .collect(),
        }
    }

    /// Appends one element to the column for `key`, creating the column
    /// if this is its first use. No type check against existing elements.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.columns.entry(key.into()).or_default().push(value.into());
    }

    /// Appends every element of a sequence to the column for `key`, in
    /// order, creating the column if this is its first use.
    ///
    /// # Errors
    ///
    /// `InvalidValue` if `values` is a scalar. The column is still
    /// created in that case (creation happens before the check).
    pub fn extend(&mut self, key: impl Into<String>, values: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let column = self.columns.entry(key.clone()).or_default();
        match values.into() {
            Value::Seq(items) => {
                column.extend(items);
                Ok(())
            }
            scalar => Err(HarnessError::InvalidValue {
                key,
                detail: format!("got a {} scalar", scalar.kind()),
            }),
        }
    }

    /// Convenience dispatch: sequences go through [`extend`](Self::extend),
    /// scalars through [`append`](Self::append).
    ///
    /// Note that [`Value::Text`] is a scalar here; callers that need
    /// exact element-vs-sequence semantics should call `append`/`extend`
    /// directly.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        match value.into() {
            Value::Seq(items) => self.columns.entry(key).or_default().extend(items),
            scalar => self.append(key, scalar),
        }
    }

    /// Merges columns of `other` into this log.
    ///
    /// For each selected key (all of `other`'s keys when `keys` is
    /// `None`), the source column is joined in as one sequence value —
    /// appended whole under [`MergeMode::Append`], flattened under
    /// [`MergeMode::Add`].
    ///
    /// Returns the merged-in values, shaped by the [`Selected`] rule.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` naming the missing key and `other`'s key set if a
    /// selected key is absent. Keys processed before the failure remain
    /// merged; there is no rollback.
    pub fn merge(
        &mut self,
        other: &RecordLog,
        keys: Option<&[&str]>,
        mode: MergeMode,
    ) -> Result<Selected<Value>> {
        let selected: Vec<String> = match keys {
            Some(keys) => keys.iter().map(|k| (*k).to_string()).collect(),
            None => other.keys().map(str::to_string).collect(),
        };

        let mut merged = Vec::with_capacity(selected.len());
        for key in selected {
            let column = other.columns.get(&key).ok_or_else(|| HarnessError::KeyNotFound {
                key: key.clone(),
                container: other.describe(),
            })?;
            let value = Value::Seq(column.clone());
            match mode {
                MergeMode::Append => self.append(key, value.clone()),
                MergeMode::Add => self.add(key, value.clone()),
            }
            merged.push(value);
        }

        Ok(match merged.len() {
            1 => Selected::One(merged.swap_remove(0)),
            _ => Selected::Many(merged),
        })
    }

    /// Returns the full column for `key`.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` if the column does not exist.
    pub fn get(&self, key: &str) -> Result<&[Value]> {
        self.columns
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| self.key_error(key))
    }

    /// Returns the columns for `keys`, in the order given, shaped by the
    /// [`Selected`] rule: a single key yields the bare column.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` on the first absent key.
    pub fn get_many(&self, keys: &[&str]) -> Result<Selected<&[Value]>> {
        let mut columns = Vec::with_capacity(keys.len());
        for key in keys {
            columns.push(self.get(key)?);
        }
        Ok(match columns.len() {
            1 => Selected::One(columns.swap_remove(0)),
            _ => Selected::Many(columns),
        })
    }

    /// Returns the element at `position` in the column for `key`.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` for an absent column, `IndexOutOfRange` for a
    /// position past the column's end.
    pub fn get_at(&self, key: &str, position: usize) -> Result<Value> {
        let column = self.get(key)?;
        column
            .get(position)
            .cloned()
            .ok_or_else(|| HarnessError::IndexOutOfRange {
                key: key.to_string(),
                position,
                len: column.len(),
            })
    }

    /// Returns the elements at `position` across several columns, shaped
    /// by the [`Selected`] rule.
    ///
    /// # Errors
    ///
    /// As [`get_at`](Self::get_at), per key.
    pub fn get_many_at(&self, keys: &[&str], position: usize) -> Result<Selected<Value>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get_at(key, position)?);
        }
        Ok(match values.len() {
            1 => Selected::One(values.swap_remove(0)),
            _ => Selected::Many(values),
        })
    }

    /// Produces a frozen snapshot of the current state.
    ///
    /// Each column is lowered to a typed vector when its elements are
    /// uniformly typed (integers widen to float alongside floats);
    /// anything else falls back to an untyped [`Column::Mixed`] — a
    /// defined degraded representation, not a failure. The log itself is
    /// unchanged and the snapshot owns independent copies.
    #[must_use]
    pub fn freeze(&self) -> RecordTable {
        RecordTable {
            columns: self
                .columns
                .iter()
                .map(|(key, values)| (key.clone(), Column::from_values(values)))
                .collect(),
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// `(key, column)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Value])> {
        self.columns
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Columns in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &[Value]> {
        self.columns.values().map(Vec::as_slice)
    }

    /// Whether a column exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.columns.contains_key(key)
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when no column exists yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Serializes the log as pretty-printed JSON, one array per key.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn describe(&self) -> String {
        format!(
            "RecordLog with keys [{}]",
            self.keys().collect::<Vec<_>>().join(", ")
        )
    }

    fn key_error(&self, key: &str) -> HarnessError {
        HarnessError::KeyNotFound {
            key: key.to_string(),
            container: self.describe(),
        }
    }
}

impl fmt::Display for RecordLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "RecordLog {{}}");
        }
        writeln!(f, "RecordLog {{")?;
        for (key, values) in self.iter() {
            writeln!(f, "  {key}: {}", Value::Seq(values.to_vec()))?;
        }
        write!(f, "}}")
    }
}

/// A frozen column: typed when the source elements allow it, untyped
/// otherwise. The representation is decided once, at freeze time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Column {
    /// Uniformly numeric elements (integers widen alongside floats).
    F64(Vec<f64>),
    /// Uniformly integer elements.
    I64(Vec<i64>),
    /// Uniformly boolean elements.
    Bool(Vec<bool>),
    /// Uniformly text elements.
    Text(Vec<String>),
    /// Fallback for mixed or nested elements.
    Mixed(Vec<Value>),
}

impl Column {
    fn from_values(values: &[Value]) -> Self {
        if values.is_empty() {
            return Column::F64(Vec::new());
        }
        if values.iter().all(|v| matches!(v, Value::Bool(_))) {
            return Column::Bool(
                values
                    .iter()
                    .map(|v| matches!(v, Value::Bool(true)))
                    .collect(),
            );
        }
        if values.iter().all(|v| matches!(v, Value::Int(_))) {
            return Column::I64(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Int(i) => *i,
                        _ => unreachable!(),
                    })
                    .collect(),
            );
        }
        if let Some(floats) = values
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<f64>>>()
        {
            return Column::F64(floats);
        }
        if values.iter().all(|v| matches!(v, Value::Text(_))) {
            return Column::Text(
                values
                    .iter()
                    .map(|v| match v {
                        Value::Text(t) => t.clone(),
                        _ => unreachable!(),
                    })
                    .collect(),
            );
        }
        Column::Mixed(values.to_vec())
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Column::F64(v) => v.len(),
            Column::I64(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Mixed(v) => v.len(),
        }
    }

    /// True when the column has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `position`, rebuilt as a [`Value`].
    #[must_use]
    pub fn value_at(&self, position: usize) -> Option<Value> {
        match self {
            Column::F64(v) => v.get(position).map(|x| Value::Float(*x)),
            Column::I64(v) => v.get(position).map(|x| Value::Int(*x)),
            Column::Bool(v) => v.get(position).map(|x| Value::Bool(*x)),
            Column::Text(v) => v.get(position).map(|x| Value::Text(x.clone())),
            Column::Mixed(v) => v.get(position).cloned(),
        }
    }

    /// Short name of the representation, used in messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Column::F64(_) => "f64",
            Column::I64(_) => "i64",
            Column::Bool(_) => "bool",
            Column::Text(_) => "text",
            Column::Mixed(_) => "mixed",
        }
    }

    /// The float content, when the column froze numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Column::F64(v) => Some(v),
            _ => None,
        }
    }

    /// The integer content, when the column froze integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            Column::I64(v) => Some(v),
            _ => None,
        }
    }

    /// The boolean content, when the column froze boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            Column::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// The text content, when the column froze text.
    #[must_use]
    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            Column::Text(v) => Some(v),
            _ => None,
        }
    }

    /// The untyped content, when the column fell back to mixed.
    #[must_use]
    pub fn as_mixed(&self) -> Option<&[Value]> {
        match self {
            Column::Mixed(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for position in 0..self.len() {
            if position > 0 {
                write!(f, ", ")?;
            }
            match self.value_at(position) {
                Some(value) => write!(f, "{value}")?,
                None => unreachable!(),
            }
        }
        write!(f, "]")
    }
}

/// Read-only snapshot of a [`RecordLog`].
///
/// Same key set and per-key element order as the source at freeze time,
/// but backed by fixed typed vectors. Owns its own copies — later
/// mutation of the source log does not reach it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct RecordTable {
    columns: IndexMap<String, Column>,
}

impl RecordTable {
    /// Builds a table from `(key, value)` pairs where every value must
    /// be a sequence.
    ///
    /// # Errors
    ///
    /// `InvalidValue` naming the offending key when a value is a scalar.
    pub fn from_values<K, I>(values: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut columns = IndexMap::new();
        for (key, value) in values {
            let key = key.into();
            match value {
                Value::Seq(items) => {
                    columns.insert(key, Column::from_values(&items));
                }
                scalar => {
                    return Err(HarnessError::InvalidValue {
                        key,
                        detail: format!("got a {} scalar", scalar.kind()),
                    })
                }
            }
        }
        Ok(Self { columns })
    }

    /// Builds a table directly from frozen columns.
    pub fn from_columns<K, I>(columns: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Column)>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(key, column)| (key.into(), column))
                .collect(),
        }
    }

    /// Returns the full column for `key`.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` if the column does not exist.
    pub fn get(&self, key: &str) -> Result<&Column> {
        self.columns.get(key).ok_or_else(|| self.key_error(key))
    }

    /// Returns the columns for `keys`, shaped by the [`Selected`] rule.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` on the first absent key.
    pub fn get_many(&self, keys: &[&str]) -> Result<Selected<&Column>> {
        let mut columns = Vec::with_capacity(keys.len());
        for key in keys {
            columns.push(self.get(key)?);
        }
        Ok(match columns.len() {
            1 => Selected::One(columns.swap_remove(0)),
            _ => Selected::Many(columns),
        })
    }

    /// Returns the element at `position` in the column for `key`.
    ///
    /// # Errors
    ///
    /// `KeyNotFound` for an absent column, `IndexOutOfRange` for a
    /// position past the column's end.
    pub fn get_at(&self, key: &str, position: usize) -> Result<Value> {
        let column = self.get(key)?;
        column
            .value_at(position)
            .ok_or_else(|| HarnessError::IndexOutOfRange {
                key: key.to_string(),
                position,
                len: column.len(),
            })
    }

    /// Returns the elements at `position` across several columns, shaped
    /// by the [`Selected`] rule.
    ///
    /// # Errors
    ///
    /// As [`get_at`](Self::get_at), per key.
    pub fn get_many_at(&self, keys: &[&str], position: usize) -> Result<Selected<Value>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get_at(key, position)?);
        }
        Ok(match values.len() {
            1 => Selected::One(values.swap_remove(0)),
            _ => Selected::Many(values),
        })
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// `(key, column)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(key, column)| (key.as_str(), column))
    }

    /// Columns in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    /// Whether a column exists for `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.columns.contains_key(key)
    }

    /// Number of columns.
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when the table has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Serializes the table as pretty-printed JSON, one array per key.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn describe(&self) -> String {
        format!(
            "RecordTable with keys [{}]",
            self.keys().collect::<Vec<_>>().join(", ")
        )
    }

    fn key_error(&self, key: &str) -> HarnessError {
        HarnessError::KeyNotFound {
            key: key.to_string(),
            container: self.describe(),
        }
    }
}

impl fmt::Display for RecordTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "RecordTable {{}}");
        }
        writeln!(f, "RecordTable {{")?;
        for (key, column) in self.iter() {
            writeln!(f, "  {key}: {column} ({})", column.kind())?;
        }
        write!(f, "}}")
    }
}
