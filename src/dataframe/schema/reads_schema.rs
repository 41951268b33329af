use polars::prelude::ArrowDataType;
use polars_arrow::datatypes::ArrowSchemaRef;

use super::{
    FieldSpec, TableSchema, TableVersion, dictionary_field, field_spec, fields_for_version,
    latest_schema, name_field, signal_schema::read_id,
};

/// Field registry for the read table (§3 "Read entity"), tagged with the
/// version each field was introduced in. `v3` is modelled as already-flat
/// (scalar `pore_type`/`end_reason` dictionaries rather than nested
/// structs) — the pre-v3 struct layout only ever exists on disk in older
/// files, and [`crate::migration`] flattens it into this shape before a
/// caller ever sees a `ReadDataFrame`.
pub fn field_specs() -> Vec<FieldSpec> {
    vec![
        field_spec(read_id(), TableVersion::V0),
        field_spec(
            name_field(
                "signal",
                ArrowDataType::List(Box::new(polars::prelude::ArrowField {
                    name: "item".into(),
                    dtype: ArrowDataType::UInt64,
                    is_nullable: true,
                    metadata: None,
                })),
            ),
            TableVersion::V0,
        ),
        field_spec(name_field("read_number", ArrowDataType::UInt32), TableVersion::V0),
        field_spec(name_field("start", ArrowDataType::UInt64), TableVersion::V0),
        field_spec(name_field("median_before", ArrowDataType::Float32), TableVersion::V0),
        field_spec(name_field("channel", ArrowDataType::UInt16), TableVersion::V0),
        field_spec(name_field("well", ArrowDataType::UInt8), TableVersion::V0),
        field_spec(dictionary_field("pore_type"), TableVersion::V0),
        field_spec(name_field("calibration_offset", ArrowDataType::Float32), TableVersion::V0),
        field_spec(name_field("calibration_scale", ArrowDataType::Float32), TableVersion::V0),
        field_spec(dictionary_field("end_reason"), TableVersion::V0),
        field_spec(name_field("end_reason_forced", ArrowDataType::Boolean), TableVersion::V0),
        field_spec(dictionary_field("run_info"), TableVersion::V0),
        // v1
        field_spec(name_field("num_minknow_events", ArrowDataType::UInt64), TableVersion::V1),
        field_spec(name_field("tracked_scaling_scale", ArrowDataType::Float32), TableVersion::V1),
        field_spec(name_field("tracked_scaling_shift", ArrowDataType::Float32), TableVersion::V1),
        field_spec(
            name_field("predicted_scaling_scale", ArrowDataType::Float32),
            TableVersion::V1,
        ),
        field_spec(
            name_field("predicted_scaling_shift", ArrowDataType::Float32),
            TableVersion::V1,
        ),
        field_spec(
            name_field("num_reads_since_mux_change", ArrowDataType::UInt32),
            TableVersion::V1,
        ),
        field_spec(
            name_field("time_since_mux_change", ArrowDataType::Float32),
            TableVersion::V1,
        ),
        // v2
        field_spec(name_field("num_samples", ArrowDataType::UInt64), TableVersion::V2),
        // v4
        field_spec(name_field("open_pore_level", ArrowDataType::Float32), TableVersion::V4),
    ]
}

#[derive(Debug, Clone)]
pub struct ReadSchema;

impl TableSchema for ReadSchema {
    fn as_schema() -> ArrowSchemaRef {
        latest_schema(&field_specs())
    }
}

impl ReadSchema {
    pub fn schema_for_version(version: TableVersion) -> polars_arrow::datatypes::ArrowSchema {
        polars_arrow::datatypes::ArrowSchema::from_iter(fields_for_version(
            &field_specs(),
            version,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn has_field(schema: &polars_arrow::datatypes::ArrowSchema, name: &str) -> bool {
        schema.iter().any(|(n, _)| n.as_str() == name)
    }

    #[test]
    fn v0_schema_excludes_later_fields() {
        let schema = ReadSchema::schema_for_version(TableVersion::V0);
        assert!(has_field(&schema, "read_id"));
        assert!(!has_field(&schema, "num_samples"));
        assert!(!has_field(&schema, "open_pore_level"));
    }

    #[test]
    fn latest_schema_has_every_field() {
        let schema = ReadSchema::as_schema();
        for name in ["read_id", "num_minknow_events", "num_samples", "open_pore_level"] {
            assert!(has_field(&schema, name), "missing {name}");
        }
    }
}
