use std::{collections::HashMap, path::{Path, PathBuf}};

use anyhow::{Context, Result, anyhow, bail, ensure};
use geo::MultiPolygon;
use polars::{frame::DataFrame, prelude::*};
use shapefile::dbase::{FieldValue, Record};
use tracing::debug;

use crate::{common::{self, FieldKind}, geom::Geometries};

/// A layer of administrative units: row `i` of `data` describes `geoms.shapes()[i]`.
#[derive(Debug, Clone)]
pub struct UnitLayer {
    id_col: String,
    geoms: Geometries,
    data: DataFrame,
}

impl UnitLayer {
    /// Pair geometries with a data frame holding an Int64 `id_col`.
    pub(crate) fn new(id_col: &str, geoms: Geometries, data: DataFrame) -> Result<Self> {
        ensure!(
            data.height() == geoms.len(),
            "Data has {} rows but the layer has {} geometries",
            data.height(), geoms.len()
        );
        ensure!(
            data.column(id_col)
                .with_context(|| format!("Missing id column {:?}", id_col))?
                .dtype() == &DataType::Int64,
            "Id column {:?} must be of type Int64", id_col
        );
        Ok(Self { id_col: id_col.to_string(), geoms, data })
    }

    /// A layer whose only attribute is the unit id.
    pub(crate) fn from_ids(id_col: &str, ids: Vec<i64>, shapes: Vec<MultiPolygon<f64>>) -> Result<Self> {
        let data = DataFrame::new(vec![Column::new(id_col.into(), ids)])?;
        Self::new(id_col, Geometries::new(shapes), data)
    }

    /// Replace the attribute table, keeping geometries.
    pub(crate) fn with_data(self, data: DataFrame) -> Result<Self> {
        Self::new(&self.id_col, self.geoms, data)
    }

    /// Reorder units (geometries and rows) by index.
    pub(crate) fn take(&self, order: &[usize]) -> Result<Self> {
        let idx = IdxCa::from_vec("idx".into(), order.iter().map(|&i| i as IdxSize).collect());
        Self::new(&self.id_col, self.geoms.take(order), self.data.take(&idx)?)
    }

    /// Get the number of units.
    #[inline] pub fn len(&self) -> usize { self.geoms.len() }

    /// Check if the layer has no units.
    #[inline] pub fn is_empty(&self) -> bool { self.geoms.is_empty() }

    /// Name of the unit id column.
    #[inline] pub fn id_col(&self) -> &str { &self.id_col }

    /// Get a reference to the attribute table.
    #[inline] pub fn data(&self) -> &DataFrame { &self.data }

    /// Get a reference to the unit geometries.
    #[inline] pub fn shapes(&self) -> &[MultiPolygon<f64>] { self.geoms.shapes() }

    #[inline] pub(crate) fn geoms(&self) -> &Geometries { &self.geoms }

    /// Check if the attribute table has a column called `name`.
    #[inline] pub fn has_column(&self, name: &str) -> bool { self.data.get_column_index(name).is_some() }

    pub fn column_names(&self) -> Vec<String> {
        self.data.get_column_names().into_iter().map(|name| name.to_string()).collect()
    }

    /// Unit ids in row order.
    pub fn adm_ids(&self) -> Result<Vec<i64>> {
        self.data.column(&self.id_col)?.i64()?.into_iter()
            .map(|id| id.ok_or_else(|| anyhow!("Null value in id column {:?}", self.id_col)))
            .collect()
    }

    /// A numeric column as floats (nulls stay `None`).
    pub fn f64_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self.data.column(name)
            .with_context(|| format!("Missing column {:?}", name))?
            .cast(&DataType::Float64)
            .with_context(|| format!("Column {:?} is not numeric", name))?;
        Ok(column.f64()?.into_iter().collect())
    }

    /// Drop the named columns that are present (the id column is kept).
    pub(crate) fn drop_columns(self, names: &[&str]) -> Result<Self> {
        let present = names.iter()
            .filter(|&&name| name != self.id_col && self.has_column(name))
            .copied()
            .collect::<Vec<_>>();
        if present.is_empty() {
            return Ok(self);
        }
        debug!(columns = ?present, "dropping stale columns");
        let data = self.data.drop_many(present);
        self.with_data(data)
    }

    /// Read units from a `.shp` file. Fields become columns (id first, the rest in
    /// file order); the id field must hold whole numbers and no nulls.
    pub fn read_shapefile(path: &Path, id_col: &str) -> Result<Self> {
        let items = common::read_shapefile(path)?;
        let names = common::read_field_names(path)?;

        let mut kinds: HashMap<String, FieldKind> = HashMap::new();
        for (_, record) in &items {
            for (name, value) in HashMap::<String, FieldValue>::from(record.clone()) {
                if let Some(kind) = common::field_kind(&value) {
                    kinds.entry(name).or_insert(kind);
                }
            }
        }
        ensure!(
            names.iter().any(|name| name == id_col),
            "Shapefile {} has no {:?} field", path.display(), id_col
        );

        let ids = items.iter().enumerate()
            .map(|(i, (_, record))| {
                let id = record.get(id_col).and_then(common::field_as_f64)
                    .with_context(|| format!("Record {} of {} has no {:?} value", i, path.display(), id_col))?;
                ensure!(
                    id.is_finite() && id.fract() == 0.0 && id.abs() < 2f64.powi(53),
                    "Record {} of {} has non-integral {:?} value {}", i, path.display(), id_col, id
                );
                Ok(id as i64)
            })
            .collect::<Result<Vec<_>>>()?;

        let fields = names.iter()
            .filter(|name| name.as_str() != id_col)
            .filter_map(|name| kinds.get(name).map(|kind| (name, kind)))
            .collect::<Vec<_>>();

        let mut columns = vec![Column::new(id_col.into(), ids)];
        for (name, kind) in fields {
            let values = items.iter().map(|(_, record)| record.get(name));
            let column = match kind {
                FieldKind::Integer | FieldKind::Float => Column::new(
                    name.as_str().into(),
                    values.map(|v| v.and_then(common::field_as_f64)).collect::<Vec<_>>(),
                ),
                FieldKind::Logical => Column::new(
                    name.as_str().into(),
                    values.map(|v| match v {
                        Some(FieldValue::Logical(b)) => *b,
                        _ => None,
                    }).collect::<Vec<_>>(),
                ),
                FieldKind::Character => Column::new(
                    name.as_str().into(),
                    values.map(|v| match v {
                        Some(FieldValue::Character(Some(s))) | Some(FieldValue::Memo(s)) => Some(s.trim().to_string()),
                        _ => None,
                    }).collect::<Vec<_>>(),
                ),
            };
            columns.push(column);
        }

        let shapes = items.into_iter().map(|(shape, _)| shape).collect::<Vec<_>>();
        debug!(path = %path.display(), units = shapes.len(), fields = columns.len(), "read shapefile");

        Self::new(id_col, Geometries::new(shapes), DataFrame::new(columns)?)
            .with_context(|| format!("Invalid unit layer in {}", path.display()))
    }

    /// Write all units and columns to a `.shp` file, replacing existing files.
    pub fn write_shapefile(&self, path: &Path) -> Result<()> {
        let mut fields = Vec::with_capacity(self.data.width());
        let mut values = Vec::with_capacity(self.data.width());
        for column in self.data.get_columns() {
            let (kind, column_values) = field_values(column)
                .with_context(|| format!("Cannot write column {:?} to {}", column.name(), path.display()))?;
            fields.push((column.name().to_string(), kind));
            values.push(column_values);
        }

        let items = self.shapes().iter().enumerate()
            .map(|(i, shape)| {
                let mut record = Record::default();
                for ((name, _), column) in fields.iter().zip(&values) {
                    record.insert(name.clone(), column[i].clone());
                }
                (shape.clone(), record)
            })
            .collect::<Vec<_>>();

        common::write_shapefile(path, &fields, &items)?;
        debug!(path = %path.display(), units = items.len(), "wrote shapefile");
        Ok(())
    }
}

/// dBase field kind and values for a column. Non-finite floats are written as null.
fn field_values(column: &Column) -> Result<(FieldKind, Vec<FieldValue>)> {
    let dtype = column.dtype();
    Ok(match dtype {
        DataType::Boolean => (
            FieldKind::Logical,
            column.bool()?.into_iter().map(FieldValue::Logical).collect(),
        ),
        DataType::String => (
            FieldKind::Character,
            column.str()?.into_iter().map(|v| FieldValue::Character(v.map(str::to_string))).collect(),
        ),
        dt if dt.is_integer() => {
            let cast = column.cast(&DataType::Int64)?;
            let values = cast.i64()?.into_iter()
                .map(|v| FieldValue::Numeric(v.map(|v| v as f64)))
                .collect();
            (FieldKind::Integer, values)
        }
        dt if dt.is_float() => {
            let cast = column.cast(&DataType::Float64)?;
            let values = cast.f64()?.into_iter()
                .map(|v| FieldValue::Numeric(v.filter(|v| v.is_finite())))
                .collect();
            (FieldKind::Float, values)
        }
        DataType::Null => (
            FieldKind::Float,
            vec![FieldValue::Numeric(None); column.len()],
        ),
        other => bail!("Unsupported column type {:?}", other),
    })
}

/// Where a stage gets its units from: a shapefile on disk or a layer already in memory.
#[derive(Debug)]
pub enum LayerSource<'a> {
    Path(&'a Path),
    Layer(UnitLayer),
}

impl<'a> LayerSource<'a> {
    /// The shapefile path, if the units live on disk.
    #[inline]
    pub fn path(&self) -> Option<&'a Path> {
        match self {
            LayerSource::Path(path) => Some(path),
            LayerSource::Layer(_) => None,
        }
    }

    /// Get the layer, reading it from disk if needed.
    pub fn load(self, id_col: &str) -> Result<UnitLayer> {
        match self {
            LayerSource::Path(path) => UnitLayer::read_shapefile(path, id_col),
            LayerSource::Layer(layer) => {
                ensure!(
                    layer.id_col() == id_col,
                    "Layer is keyed by {:?}, expected {:?}", layer.id_col(), id_col
                );
                Ok(layer)
            }
        }
    }
}

impl<'a> From<&'a Path> for LayerSource<'a> {
    fn from(path: &'a Path) -> Self { LayerSource::Path(path) }
}

impl<'a> From<&'a PathBuf> for LayerSource<'a> {
    fn from(path: &'a PathBuf) -> Self { LayerSource::Path(path.as_path()) }
}

impl From<UnitLayer> for LayerSource<'_> {
    fn from(layer: UnitLayer) -> Self { LayerSource::Layer(layer) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};
    use polars::df;

    fn square(x: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: 0.0), (x: x + 1.0, y: 0.0), (x: x + 1.0, y: 1.0), (x: x, y: 1.0),
        ]])
    }

    fn layer() -> UnitLayer {
        let data = df![
            "adm_id" => [7i64, 3],
            "pop" => [Some(10.0), None],
            "paired" => [true, false],
            "name" => ["a", "b"],
        ].unwrap();
        UnitLayer::new("adm_id", Geometries::new(vec![square(0.0), square(1.0)]), data).unwrap()
    }

    #[test]
    fn id_column_must_be_present_and_integral() {
        let geoms = Geometries::new(vec![square(0.0)]);
        assert!(UnitLayer::new("adm_id", geoms.clone(), df!["other" => [1i64]].unwrap()).is_err());
        assert!(UnitLayer::new("adm_id", geoms.clone(), df!["adm_id" => [1.5]].unwrap()).is_err());
        assert!(UnitLayer::new("adm_id", geoms, df!["adm_id" => [1i64, 2]].unwrap()).is_err());
    }

    #[test]
    fn accessors() {
        let layer = layer();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.adm_ids().unwrap(), vec![7, 3]);
        assert_eq!(layer.f64_column("pop").unwrap(), vec![Some(10.0), None]);
        assert!(layer.f64_column("missing").is_err());
        assert_eq!(layer.column_names(), vec!["adm_id", "pop", "paired", "name"]);
    }

    #[test]
    fn take_reorders_rows_and_shapes() {
        let layer = layer().take(&[1, 0]).unwrap();
        assert_eq!(layer.adm_ids().unwrap(), vec![3, 7]);
        assert_eq!(layer.shapes()[0], square(1.0));
    }

    #[test]
    fn drop_columns_keeps_id() {
        let layer = layer().drop_columns(&["pop", "adm_id", "absent"]).unwrap();
        assert_eq!(layer.column_names(), vec!["adm_id", "paired", "name"]);
    }

    #[test]
    fn shapefile_keeps_column_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.shp");
        layer().write_shapefile(&path).unwrap();

        let read = UnitLayer::read_shapefile(&path, "adm_id").unwrap();
        assert_eq!(read.column_names(), vec!["adm_id", "pop", "paired", "name"]);
        assert_eq!(read.adm_ids().unwrap(), vec![7, 3]);
        assert_eq!(read.f64_column("pop").unwrap(), vec![Some(10.0), None]);
        assert_eq!(read.data().column("paired").unwrap().dtype(), &DataType::Boolean);
        assert_eq!(read.data().column("name").unwrap().str().unwrap().get(1), Some("b"));
    }

    #[test]
    fn fractional_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.shp");
        let data = df!["adm_id" => [7i64, 3], "code" => [1.0, 2.5]].unwrap();
        UnitLayer::new("adm_id", Geometries::new(vec![square(0.0), square(1.0)]), data)
            .unwrap()
            .write_shapefile(&path)
            .unwrap();

        assert!(UnitLayer::read_shapefile(&path, "adm_id").is_ok());
        let err = UnitLayer::read_shapefile(&path, "code").unwrap_err();
        assert!(err.to_string().contains("non-integral"), "{err}");
    }

    #[test]
    fn shapefile_keeps_holes_and_islands() {
        let ring = MultiPolygon(vec![
            polygon!(
                exterior: [(x: 0.0, y: 0.0), (x: 5.0, y: 0.0), (x: 5.0, y: 5.0), (x: 0.0, y: 5.0)],
                interiors: [[(x: 1.0, y: 1.0), (x: 1.0, y: 4.0), (x: 4.0, y: 4.0), (x: 4.0, y: 1.0)]],
            ),
            polygon![(x: 2.0, y: 2.0), (x: 3.0, y: 2.0), (x: 3.0, y: 3.0), (x: 2.0, y: 3.0)],
        ]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("island.shp");
        UnitLayer::from_ids("adm_id", vec![1], vec![ring]).unwrap().write_shapefile(&path).unwrap();

        let read = UnitLayer::read_shapefile(&path, "adm_id").unwrap();
        let shape = &read.shapes()[0];
        assert_eq!(shape.unsigned_area(), 17.0);
        assert_eq!(shape.0.iter().map(|p| p.interiors().len()).sum::<usize>(), 1);
    }

    #[test]
    fn missing_id_field_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("units.shp");
        layer().write_shapefile(&path).unwrap();
        assert!(UnitLayer::read_shapefile(&path, "GID").is_err());
    }

    #[test]
    fn source_from_layer_checks_id_column() {
        assert!(LayerSource::from(layer()).load("adm_id").is_ok());
        assert!(LayerSource::from(layer()).load("GID").is_err());

        let path = PathBuf::from("units.shp");
        assert_eq!(LayerSource::from(&path).path(), Some(path.as_path()));
    }
}
