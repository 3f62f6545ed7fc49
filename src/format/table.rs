//! A small column-ordered table built from Shortcut's JSON entities.
//!
//! Shortcut returns several entity fields as arrays of ids (followers,
//! labels, owners, ...). [`Table::flatten`] explodes those fields so each
//! row carries at most one id per field, which is what spreadsheet and
//! dataframe tooling expects.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use arrow_array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, RecordBatchOptions, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use serde_json::{Map, Value};

use super::error::{FormatError, Result};

/// Entity fields that Shortcut returns as arrays and that get exploded.
pub const ARRAY_FIELDS: [&str; 28] = [
    "branch_ids",
    "comment_ids",
    "commit_ids",
    "custom_field_value_ids",
    "epic_ids",
    "file_ids",
    "follower_ids",
    "group_ids",
    "group_mention_ids",
    "iteration_ids",
    "key_result_ids",
    "label_ids",
    "linked_file_ids",
    "member_ids",
    "member_mention_ids",
    "mention_ids",
    "merged_branch_ids",
    "object_story_link_ids",
    "objective_ids",
    "owner_ids",
    "permission_ids",
    "previous_iteration_ids",
    "project_ids",
    "pull_request_ids",
    "story_ids",
    "subject_story_link_ids",
    "task_ids",
    "workflow_ids",
];

/// Column name used when the JSON array holds scalars instead of objects.
const VALUE_COLUMN: &str = "value";

/// Rows of JSON cells under named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// A borrowed view of one table row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Cell in `column`, if the column exists.
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

impl Table {
    /// Build a table from a decoded response body.
    ///
    /// An array of objects yields one row per object, a single object yields
    /// one row, and an array of scalars yields a single `value` column.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::UnsupportedShape`] for bare scalars and for
    /// arrays mixing objects with other values.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(record) => Ok(Self::from_records([record])),
            Value::Array(items) if items.iter().all(Value::is_object) => Ok(Self::from_records(
                items.iter().filter_map(Value::as_object),
            )),
            Value::Array(items) if !items.iter().any(Value::is_object) => Ok(Self {
                columns: vec![VALUE_COLUMN.to_string()],
                rows: items.iter().map(|item| vec![item.clone()]).collect(),
            }),
            Value::Array(_) => Err(FormatError::UnsupportedShape(
                "an array mixing objects and scalars".to_string(),
            )),
            other => Err(FormatError::UnsupportedShape(format!(
                "a bare JSON {}",
                json_kind(other)
            ))),
        }
    }

    /// Build a table from JSON objects.
    ///
    /// Columns appear in first-seen key order; missing keys become `null`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut sparse: Vec<Vec<(usize, Value)>> = Vec::new();

        for record in records {
            let mut cells = Vec::with_capacity(record.len());
            for (key, value) in record {
                let i = *index.entry(key.clone()).or_insert_with(|| {
                    columns.push(key.clone());
                    columns.len() - 1
                });
                cells.push((i, value.clone()));
            }
            sparse.push(cells);
        }

        let width = columns.len();
        let rows = sparse
            .into_iter()
            .map(|cells| {
                let mut row = vec![Value::Null; width];
                for (i, value) in cells {
                    row[i] = value;
                }
                row
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row {
            columns: &self.columns,
            values,
        })
    }

    /// All cells of `column`, top to bottom.
    pub fn column(&self, column: &str) -> Option<Vec<&Value>> {
        let i = self.column_index(column)?;
        Some(self.rows.iter().map(|row| &row[i]).collect())
    }

    fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Duplicate each row once per element of its array in `column`.
    ///
    /// Empty arrays leave a single row holding `null`. Non-array cells and
    /// unknown columns are left alone.
    pub fn explode(self, column: &str) -> Self {
        let Some(i) = self.column_index(column) else {
            return self;
        };

        let mut rows = Vec::with_capacity(self.rows.len());
        for mut row in self.rows {
            match std::mem::take(&mut row[i]) {
                Value::Array(items) if items.is_empty() => rows.push(row),
                Value::Array(items) => {
                    for item in items {
                        let mut exploded = row.clone();
                        exploded[i] = item;
                        rows.push(exploded);
                    }
                }
                other => {
                    row[i] = other;
                    rows.push(row);
                }
            }
        }

        Self {
            columns: self.columns,
            rows,
        }
    }

    /// Explode every field in [`ARRAY_FIELDS`].
    pub fn flatten(self) -> Self {
        ARRAY_FIELDS
            .iter()
            .fold(self, |table, field| table.explode(field))
    }

    /// Rows for which `predicate` holds.
    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: Fn(&Row<'_>) -> bool,
    {
        let rows = self
            .rows()
            .filter(|row| predicate(row))
            .map(|row| row.values.to_vec())
            .collect();
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Rows whose `column` equals `value`.
    pub fn filter_eq(&self, column: &str, value: &Value) -> Self {
        self.filter(|row| row.get(column) == Some(value))
    }

    /// Write the table as delimited text with a header row.
    pub fn write_csv<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut csv = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);

        csv.write_record(&self.columns)?;
        for row in &self.rows {
            csv.write_record(row.iter().map(cell_text))?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Convert to an Arrow record batch.
    ///
    /// Columns holding only booleans, integers or numbers get native types;
    /// everything else is stored as text. A table without columns, like the
    /// one built from an empty result list, keeps its row count.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        if self.columns.is_empty() {
            let options = RecordBatchOptions::new().with_row_count(Some(self.len()));
            return Ok(RecordBatch::try_new_with_options(
                Arc::new(Schema::empty()),
                Vec::new(),
                &options,
            )?);
        }

        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());

        for (i, name) in self.columns.iter().enumerate() {
            let cells = self.rows.iter().map(|row| &row[i]);
            let (data_type, array): (DataType, ArrayRef) = match ColumnKind::infer(cells.clone()) {
                ColumnKind::Boolean => (
                    DataType::Boolean,
                    Arc::new(BooleanArray::from(
                        cells.map(Value::as_bool).collect::<Vec<_>>(),
                    )),
                ),
                ColumnKind::Int64 => (
                    DataType::Int64,
                    Arc::new(Int64Array::from(
                        cells.map(Value::as_i64).collect::<Vec<_>>(),
                    )),
                ),
                ColumnKind::Float64 => (
                    DataType::Float64,
                    Arc::new(Float64Array::from(
                        cells.map(Value::as_f64).collect::<Vec<_>>(),
                    )),
                ),
                ColumnKind::Utf8 => (
                    DataType::Utf8,
                    Arc::new(StringArray::from(
                        cells
                            .map(|v| (!v.is_null()).then(|| cell_text(v)))
                            .collect::<Vec<_>>(),
                    )),
                ),
            };
            fields.push(Field::new(name.as_str(), data_type, true));
            arrays.push(array);
        }

        let schema = Arc::new(Schema::new(fields));
        Ok(RecordBatch::try_new(schema, arrays)?)
    }

    /// Write the table as a Parquet file.
    pub fn write_parquet<W: Write + Send>(&self, writer: W) -> Result<()> {
        let batch = self.to_record_batch()?;
        let mut parquet = ArrowWriter::try_new(writer, batch.schema(), None)?;
        parquet.write(&batch)?;
        parquet.close()?;
        Ok(())
    }
}

/// Text of a cell as written to CSV: strings unquoted, nulls empty,
/// nested values as compact JSON.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Arrow type for a column of JSON cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Boolean,
    Int64,
    Float64,
    Utf8,
}

impl ColumnKind {
    fn infer<'a>(cells: impl Iterator<Item = &'a Value>) -> Self {
        let mut kind: Option<ColumnKind> = None;
        for cell in cells {
            let cell_kind = match cell {
                Value::Null => continue,
                Value::Bool(_) => ColumnKind::Boolean,
                Value::Number(n) if n.is_i64() => ColumnKind::Int64,
                Value::Number(_) => ColumnKind::Float64,
                _ => return ColumnKind::Utf8,
            };
            kind = Some(match (kind, cell_kind) {
                (None, k) => k,
                (Some(a), b) if a == b => a,
                (Some(ColumnKind::Int64), ColumnKind::Float64)
                | (Some(ColumnKind::Float64), ColumnKind::Int64) => ColumnKind::Float64,
                _ => return ColumnKind::Utf8,
            });
        }
        kind.unwrap_or(ColumnKind::Utf8)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return write!(f, "Empty table\nColumns: [{}]", self.columns.join(", "));
        }

        let display = |v: &Value| match v {
            Value::Null => "null".to_string(),
            other => cell_text(other),
        };
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(display).collect())
            .collect();

        let index_width = (self.rows.len() - 1).to_string().len();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        write!(f, "{:width$}", "", width = index_width)?;
        for (name, width) in self.columns.iter().zip(&widths) {
            write!(f, "  {:>width$}", name, width = *width)?;
        }
        for (n, row) in cells.iter().enumerate() {
            write!(f, "\n{:<width$}", n, width = index_width)?;
            for (cell, width) in row.iter().zip(&widths) {
                write!(f, "  {:>width$}", cell, width = *width)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn epic(id: i64, archived: bool, label_ids: Value) -> Value {
        json!({
            "app_url": format!("https://app.shortcut.com/testworkspace/epics/{}", id),
            "archived": archived,
            "completed": true,
            "completed_at": "2016-12-31T12:30:00Z",
            "created_at": "2016-12-31T12:30:00Z",
            "deadline": "2017-01-01T12:30:00Z",
            "description": format!("Epic {}", id),
            "entity_type": "epic",
            "epic_state_id": 987,
            "follower_ids": ["12345678-9012-3456-7890-123456789012"],
            "group_ids": ["12345678-9012-3456-7890-123456789012"],
            "id": id,
            "label_ids": label_ids,
            "name": format!("Epic {}", id),
            "owner_ids": ["12345678-9012-3456-7890-123456789012"],
            "planned_start_date": "2016-12-31T12:30:00Z",
            "requested_by_id": "12345678-9012-3456-7890-123456789012",
            "started": true,
            "started_at": "2016-11-30T12:30:00Z",
            "state": "done",
            "updated_at": "2020-12-31T12:30:00Z",
        })
    }

    fn example_epics() -> Value {
        json!([
            epic(123, true, json!([567, 678, 890])),
            epic(234, false, json!([567, 678])),
        ])
    }

    #[test]
    fn test_from_json_array_of_objects() {
        let table = Table::from_json(&example_epics()).unwrap();
        assert_eq!(table.shape(), (2, 21));
        assert_eq!(table.columns()[0], "app_url");
        assert_eq!(table.columns()[20], "updated_at");
    }

    #[test]
    fn test_from_json_single_object() {
        let table = Table::from_json(&json!({"id": 1, "name": "one"})).unwrap();
        assert_eq!(table.shape(), (1, 2));
    }

    #[test]
    fn test_from_json_scalars() {
        let table = Table::from_json(&json!([1, 2, 3])).unwrap();
        assert_eq!(table.columns(), ["value"]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_from_json_rejects_bare_scalar() {
        assert!(matches!(
            Table::from_json(&json!("hello")),
            Err(FormatError::UnsupportedShape(_))
        ));
        assert!(Table::from_json(&json!([{"id": 1}, 2])).is_err());
    }

    #[test]
    fn test_missing_keys_become_null() {
        let table = Table::from_json(&json!([{"id": 1}, {"id": 2, "name": "two"}])).unwrap();
        assert_eq!(table.columns(), ["id", "name"]);
        assert_eq!(table.column("name").unwrap(), vec![&Value::Null, &json!("two")]);
    }

    #[test]
    fn test_flatten_explodes_label_ids() {
        let entity = json!({"id": 1, "name": "story", "label_ids": [567, 678, 890]});
        let table = Table::from_json(&entity).unwrap().flatten();

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.column("label_ids").unwrap(),
            vec![&json!(567), &json!(678), &json!(890)]
        );
        for row in table.rows() {
            assert_eq!(row.get("id"), Some(&json!(1)));
            assert_eq!(row.get("name"), Some(&json!("story")));
        }
    }

    #[test]
    fn test_flatten_leaves_unlisted_arrays() {
        let entity = json!({"id": 1, "estimate_scale": [0, 1, 2], "label_ids": [5]});
        let table = Table::from_json(&entity).unwrap().flatten();

        assert_eq!(table.len(), 1);
        assert_eq!(table.column("estimate_scale").unwrap(), vec![&json!([0, 1, 2])]);
        assert_eq!(table.column("label_ids").unwrap(), vec![&json!(5)]);
    }

    #[test]
    fn test_flatten_empty_array_keeps_row() {
        let table = Table::from_json(&json!([{"id": 1, "owner_ids": []}]))
            .unwrap()
            .flatten();
        assert_eq!(table.len(), 1);
        assert_eq!(table.column("owner_ids").unwrap(), vec![&Value::Null]);
    }

    #[test]
    fn test_flatten_multiple_fields_is_cartesian() {
        let entity = json!({"id": 1, "label_ids": [1, 2], "owner_ids": ["a", "b", "c"]});
        let table = Table::from_json(&entity).unwrap().flatten();
        assert_eq!(table.len(), 6);
    }

    #[test]
    fn test_filter_archived_after_flatten() {
        let table = Table::from_json(&example_epics()).unwrap().flatten();
        assert_eq!(table.len(), 5);

        let archived = table.filter_eq("archived", &json!(true));
        assert_eq!(archived.len(), 3);
        assert!(archived.rows().all(|row| row.get("id") == Some(&json!(123))));
    }

    #[test]
    fn test_filter_unflattened() {
        let table = Table::from_json(&example_epics()).unwrap();
        let archived = table.filter(|row| row.get("archived") == Some(&json!(true)));
        assert_eq!(archived.shape(), (1, 21));
    }

    #[test]
    fn test_csv_roundtrip() {
        let table = Table::from_json(&example_epics()).unwrap().flatten();
        let mut buf = Vec::new();
        table.write_csv(&mut buf, b',').unwrap();

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, table.columns());

        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), table.len());
        for (record, row) in records.iter().zip(table.rows()) {
            let expected: Vec<String> = row.values().iter().map(cell_text).collect();
            let actual: Vec<&str> = record.iter().collect();
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_tsv_uses_tabs() {
        let table = Table::from_json(&json!([{"id": 1, "name": "a, b"}])).unwrap();
        let mut buf = Vec::new();
        table.write_csv(&mut buf, b'\t').unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "id\tname\n1\ta, b\n");
    }

    #[test]
    fn test_record_batch_types() {
        let table = Table::from_json(&json!([
            {"id": 1, "archived": true, "estimate": 1.5, "name": "a"},
            {"id": 2, "archived": null, "estimate": 2, "name": 3}
        ]))
        .unwrap();
        let batch = table.to_record_batch().unwrap();
        let schema = batch.schema();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Boolean);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert_eq!(schema.field(3).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_record_batch_without_columns_keeps_row_count() {
        let empty = Table::from_json(&json!([])).unwrap().to_record_batch().unwrap();
        assert_eq!((empty.num_rows(), empty.num_columns()), (0, 0));

        let blank = Table::from_json(&json!([{}])).unwrap().to_record_batch().unwrap();
        assert_eq!((blank.num_rows(), blank.num_columns()), (1, 0));
    }

    #[test]
    fn test_write_parquet() {
        let table = Table::from_json(&example_epics()).unwrap().flatten();
        let mut buf = Vec::new();
        table.write_parquet(&mut buf).unwrap();
        assert!(buf.starts_with(b"PAR1"));
        assert!(buf.ends_with(b"PAR1"));
    }

    #[test]
    fn test_display() {
        let table = Table::from_json(&json!([
            {"id": 1, "name": "alpha"},
            {"id": 22, "name": null}
        ]))
        .unwrap();
        assert_eq!(
            table.to_string(),
            "   id   name\n0   1  alpha\n1  22   null"
        );
    }

    #[test]
    fn test_display_empty() {
        let table = Table::from_json(&json!([])).unwrap();
        assert_eq!(table.to_string(), "Empty table\nColumns: []");
    }
}
