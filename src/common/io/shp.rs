use std::{fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use geo::MultiPolygon;
use shapefile::{dbase::{FieldName, FieldValue, Record, TableWriterBuilder}, Reader, Shape, Writer};

use crate::common::{geo_to_shp, shp_to_geo};

/// WGS84 geographic coordinate system, as written to `.prj` sidecars.
const WGS84_PRJ: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// dBase storage class of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Integer,
    Float,
    Logical,
    Character,
}

/// Reads all polygons + attribute records from a given `.shp` file path.
pub(crate) fn read_shapefile(path: &Path) -> Result<Vec<(MultiPolygon<f64>, Record)>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {}", path.display()))?;

    let mut items = Vec::with_capacity(reader.shape_count()?);
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.context("Error reading shape+record")?;
        let geom = match shape {
            Shape::Polygon(polygon) => shp_to_geo(&polygon),
            Shape::NullShape => MultiPolygon(vec![]),
            other => bail!("Unsupported shape type {:?} in {}", other.shapetype(), path.display()),
        };
        items.push((geom, record));
    }
    Ok(items)
}

/// dBase field names of the shapefile at `path`, in the order they are declared.
pub(crate) fn read_field_names(path: &Path) -> Result<Vec<String>> {
    let dbf = path.with_extension("dbf");
    let reader = shapefile::dbase::Reader::from_path(&dbf)
        .with_context(|| format!("Failed to open attribute table: {}", dbf.display()))?;
    Ok(reader.fields().iter().map(|field| field.name().to_string()).collect())
}

/// Writes polygons + records to `path` (with `.shx`, `.dbf` and a WGS84 `.prj`), replacing existing files.
pub(crate) fn write_shapefile(
    path: &Path,
    fields: &[(String, FieldKind)],
    items: &[(MultiPolygon<f64>, Record)],
) -> Result<()> {
    let mut builder = TableWriterBuilder::new();
    for (name, kind) in fields {
        let field_name = FieldName::try_from(name.as_str())
            .map_err(|_| anyhow!("Invalid dBase field name {:?} (at most 10 ASCII characters)", name))?;
        builder = match kind {
            FieldKind::Integer => builder.add_numeric_field(field_name, 18, 0),
            FieldKind::Float => builder.add_numeric_field(field_name, 33, 15),
            FieldKind::Logical => builder.add_logical_field(field_name),
            FieldKind::Character => builder.add_character_field(field_name, 254),
        };
    }

    {
        let mut writer = Writer::from_path(path, builder)
            .with_context(|| format!("Failed to create shapefile: {}", path.display()))?;

        for (i, (geom, record)) in items.iter().enumerate() {
            if geom.0.is_empty() {
                bail!("Cannot write empty geometry for record {} to {}", i, path.display());
            }
            writer.write_shape_and_record(&geo_to_shp(geom), record)
                .with_context(|| format!("Failed to write record {} to {}", i, path.display()))?;
        }
    }

    fs::write(path.with_extension("prj"), WGS84_PRJ)
        .with_context(|| format!("Failed to write projection file for {}", path.display()))?;

    Ok(())
}

/// Numeric view of a dBase value (nulls and non-numeric fields give `None`).
pub(crate) fn field_as_f64(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Numeric(n) => *n,
        FieldValue::Float(f) => f.map(f64::from),
        FieldValue::Double(d) => Some(*d),
        FieldValue::Integer(i) => Some(f64::from(*i)),
        FieldValue::Currency(c) => Some(*c),
        _ => None,
    }
}

/// Storage class of a dBase value read from disk, if it is one we carry over.
pub(crate) fn field_kind(value: &FieldValue) -> Option<FieldKind> {
    match value {
        FieldValue::Numeric(_) | FieldValue::Float(_) | FieldValue::Double(_) | FieldValue::Currency(_) => Some(FieldKind::Float),
        FieldValue::Integer(_) => Some(FieldKind::Integer),
        FieldValue::Logical(_) => Some(FieldKind::Logical),
        FieldValue::Character(_) | FieldValue::Memo(_) => Some(FieldKind::Character),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    fn unit_square(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y), (x: x + 1.0, y: y), (x: x + 1.0, y: y + 1.0), (x: x, y: y + 1.0),
        ]])
    }

    fn record(id: f64, name: &str, flag: bool) -> Record {
        let mut record = Record::default();
        record.insert("adm_id".to_string(), FieldValue::Numeric(Some(id)));
        record.insert("name".to_string(), FieldValue::Character(Some(name.to_string())));
        record.insert("paired".to_string(), FieldValue::Logical(Some(flag)));
        record
    }

    fn fields() -> Vec<(String, FieldKind)> {
        vec![
            ("adm_id".to_string(), FieldKind::Integer),
            ("name".to_string(), FieldKind::Character),
            ("paired".to_string(), FieldKind::Logical),
        ]
    }

    #[test]
    fn write_then_read_shapefile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.shp");

        let items = vec![
            (unit_square(0.0, 0.0), record(1.0, "north", false)),
            (unit_square(1.0, 0.0), record(2.0, "south", true)),
        ];
        write_shapefile(&path, &fields(), &items).unwrap();

        assert!(path.with_extension("dbf").exists());
        assert!(path.with_extension("shx").exists());
        assert!(fs::read_to_string(path.with_extension("prj")).unwrap().contains("WGS_1984"));

        assert_eq!(read_field_names(&path).unwrap(), vec!["adm_id", "name", "paired"]);

        let read = read_shapefile(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[1].0.unsigned_area(), 1.0);
        assert_eq!(read[0].1.get("adm_id").and_then(field_as_f64), Some(1.0));
        assert_eq!(read[1].1.get("name"), Some(&FieldValue::Character(Some("south".to_string()))));
        assert_eq!(read[1].1.get("paired"), Some(&FieldValue::Logical(Some(true))));
    }

    #[test]
    fn long_field_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fields = vec![("population_density".to_string(), FieldKind::Float)];
        let err = write_shapefile(&dir.path().join("x.shp"), &fields, &[]).unwrap_err();
        assert!(err.to_string().contains("Invalid dBase field name"));
    }

    #[test]
    fn empty_geometries_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let items = vec![(MultiPolygon(vec![]), record(1.0, "x", false))];
        assert!(write_shapefile(&dir.path().join("x.shp"), &fields(), &items).is_err());
    }

    #[test]
    fn numeric_field_values() {
        assert_eq!(field_as_f64(&FieldValue::Numeric(Some(2.5))), Some(2.5));
        assert_eq!(field_as_f64(&FieldValue::Numeric(None)), None);
        assert_eq!(field_as_f64(&FieldValue::Integer(7)), Some(7.0));
        assert_eq!(field_as_f64(&FieldValue::Character(Some("7".into()))), None);
        assert_eq!(field_kind(&FieldValue::Logical(None)), Some(FieldKind::Logical));
    }
}
