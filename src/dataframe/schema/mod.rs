//! Per-table field registries (§4.5): each table's logical schema is an
//! ordered list of fields tagged with the table version they were
//! introduced in (and, where applicable, removed in). A reader matches
//! physical columns to this registry by name; a writer always emits the
//! latest version's columns.
use std::sync::Arc;

use polars::prelude::{ArrowDataType, ArrowField, PlSmallStr};
use polars_arrow::datatypes::{ArrowSchema, ArrowSchemaRef, IntegerType, Metadata};

pub mod reads_schema;
pub mod run_info_schema;
pub mod signal_schema;

/// Logical version of the read-table schema, following the
/// `pod5_version` bump points documented for the reference implementation:
/// 0.0.24 / 0.0.32 / 0.0.38 (v1/v2/v3 boundaries) and 0.3.30 (v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TableVersion {
    V0,
    V1,
    V2,
    V3,
    V4,
}

impl TableVersion {
    pub const LATEST: TableVersion = TableVersion::V4;

    /// Maps a `MINKNOW:pod5_version` string (`"maj.min.rev"`) to the table
    /// version that was current as of that software release.
    pub fn from_pod5_version(version: &str) -> Self {
        let parts: Vec<u32> = version
            .split('.')
            .map(|p| p.parse().unwrap_or(0))
            .collect();
        let (maj, min, rev) = (
            parts.first().copied().unwrap_or(0),
            parts.get(1).copied().unwrap_or(0),
            parts.get(2).copied().unwrap_or(0),
        );
        let tuple = (maj, min, rev);
        if tuple >= (0, 3, 30) {
            TableVersion::V4
        } else if tuple >= (0, 0, 38) {
            TableVersion::V3
        } else if tuple >= (0, 0, 32) {
            TableVersion::V2
        } else if tuple >= (0, 0, 24) {
            TableVersion::V1
        } else {
            TableVersion::V0
        }
    }

    pub fn next(self) -> Option<TableVersion> {
        match self {
            TableVersion::V0 => Some(TableVersion::V1),
            TableVersion::V1 => Some(TableVersion::V2),
            TableVersion::V2 => Some(TableVersion::V3),
            TableVersion::V3 => Some(TableVersion::V4),
            TableVersion::V4 => None,
        }
    }
}

pub trait TableSchema {
    /// The schema a writer emits: always every field, at the latest version.
    fn as_schema() -> ArrowSchemaRef;
}

/// One field of a schema-versioned table.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: PlSmallStr,
    pub field: ArrowField,
    pub added_in: TableVersion,
    pub removed_in: Option<TableVersion>,
}

impl FieldSpec {
    fn present_at(&self, version: TableVersion) -> bool {
        self.added_in <= version && self.removed_in.is_none_or(|r| version < r)
    }
}

/// The columns of `specs` that exist at `version`, in declared order.
pub fn fields_for_version(
    specs: &[FieldSpec],
    version: TableVersion,
) -> Vec<(PlSmallStr, ArrowField)> {
    specs
        .iter()
        .filter(|f| f.present_at(version))
        .map(|f| (f.name.clone(), f.field.clone()))
        .collect()
}

/// The full, current-version schema built from a field registry; this is
/// always what a writer emits.
pub fn latest_schema(specs: &[FieldSpec]) -> ArrowSchemaRef {
    Arc::new(ArrowSchema::from_iter(fields_for_version(
        specs,
        TableVersion::LATEST,
    )))
}

/// Maps each declared field to the index of the physical column with the
/// same name, if present. Built once per opened table and reused for every
/// batch read from it (§4.5: "the matched indices form a `FieldLocations`
/// table used for column access").
#[derive(Debug, Clone)]
pub struct FieldLocations {
    /// `locations[i]` is the physical column index for `specs[i]`, or `None`
    /// if the physical schema doesn't carry that field (older file version,
    /// or a column this reader doesn't otherwise recognise).
    locations: Vec<Option<usize>>,
}

impl FieldLocations {
    pub fn resolve(specs: &[FieldSpec], physical: &[PlSmallStr]) -> Self {
        let locations = specs
            .iter()
            .map(|spec| physical.iter().position(|name| name == &spec.name))
            .collect();
        Self { locations }
    }

    pub fn location(&self, field_index: usize) -> Option<usize> {
        self.locations.get(field_index).copied().flatten()
    }

    pub fn is_present(&self, field_index: usize) -> bool {
        self.location(field_index).is_some()
    }
}

pub(crate) fn name_field_md<S, I, K, V>(name: S, dtype: ArrowDataType, metadata: I) -> (PlSmallStr, ArrowField)
where
    S: Into<PlSmallStr>,
    I: Iterator<Item = (K, V)>,
    K: Into<PlSmallStr>,
    V: Into<PlSmallStr>,
{
    let name = name.into();
    (
        name.clone(),
        ArrowField {
            name,
            dtype,
            is_nullable: true,
            metadata: Some(Arc::new(Metadata::from_iter(
                metadata.map(|(k, v)| (k.into(), v.into())),
            ))),
        },
    )
}

pub(crate) fn name_field<S: Into<PlSmallStr>>(
    name: S,
    dtype: ArrowDataType,
) -> (PlSmallStr, ArrowField) {
    let name = name.into();
    (
        name.clone(),
        ArrowField {
            name,
            dtype,
            is_nullable: true,
            metadata: Default::default(),
        },
    )
}

fn dictionary_field<S: Into<PlSmallStr>>(name: S) -> (PlSmallStr, ArrowField) {
    name_field(
        name,
        ArrowDataType::Dictionary(IntegerType::Int16, Box::new(ArrowDataType::Utf8), false),
    )
}

pub(crate) fn map_field<S: Into<PlSmallStr>>(name: S) -> (PlSmallStr, ArrowField) {
    let mut key = name_field("key", ArrowDataType::Utf8).1;
    let value = name_field("value", ArrowDataType::Utf8).1;
    key.is_nullable = false;
    name_field(
        name,
        ArrowDataType::Map(
            Box::new(ArrowField {
                name: "entries".into(),
                dtype: ArrowDataType::Struct(vec![key, value]),
                is_nullable: false,
                metadata: None,
            }),
            false,
        ),
    )
}

pub(crate) fn field_spec(name_field: (PlSmallStr, ArrowField), added_in: TableVersion) -> FieldSpec {
    FieldSpec {
        name: name_field.0,
        field: name_field.1,
        added_in,
        removed_in: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_version_maps_bump_points() {
        assert_eq!(TableVersion::from_pod5_version("0.0.10"), TableVersion::V0);
        assert_eq!(TableVersion::from_pod5_version("0.0.24"), TableVersion::V1);
        assert_eq!(TableVersion::from_pod5_version("0.0.32"), TableVersion::V2);
        assert_eq!(TableVersion::from_pod5_version("0.0.38"), TableVersion::V3);
        assert_eq!(TableVersion::from_pod5_version("0.3.30"), TableVersion::V4);
        assert_eq!(TableVersion::from_pod5_version("0.3.40"), TableVersion::V4);
    }

    #[test]
    fn field_locations_resolves_by_name_and_defaults_missing() {
        let specs = vec![
            field_spec(name_field("a", ArrowDataType::UInt32), TableVersion::V0),
            field_spec(name_field("b", ArrowDataType::UInt32), TableVersion::V1),
        ];
        let physical: Vec<PlSmallStr> = vec!["a".into()];
        let locations = FieldLocations::resolve(&specs, &physical);
        assert_eq!(locations.location(0), Some(0));
        assert_eq!(locations.location(1), None);
        assert!(!locations.is_present(1));
    }
}
