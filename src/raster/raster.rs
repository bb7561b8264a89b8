use std::path::Path;

use anyhow::{ensure, Context, Result};
use geo::Coord;
use ndarray::Array2;
use tiff::encoder::colortype;
use tracing::{debug, warn};

use crate::common;

/// GDAL-ordered affine transform `[x0, a, b, y0, d, e]`:
/// `X = x0 + col * a + row * b`, `Y = y0 + col * d + row * e`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    /// Pixel space as world space (used for rasters without georeferencing).
    pub const IDENTITY: Self = Self([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    #[inline] pub fn new(coeffs: [f64; 6]) -> Self { Self(coeffs) }

    /// North-up transform from the top-left corner and the pixel size.
    #[inline]
    pub fn north_up(x0: f64, y0: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self([x0, pixel_width, 0.0, y0, 0.0, -pixel_height])
    }

    #[inline] pub fn coeffs(&self) -> [f64; 6] { self.0 }

    /// World coordinates of a (fractional) pixel position.
    #[inline]
    pub fn vertex(&self, col: f64, row: f64) -> Coord<f64> {
        let [x0, a, b, y0, d, e] = self.0;
        Coord { x: x0 + col * a + row * b, y: y0 + col * d + row * e }
    }

    /// World coordinates of the centre of pixel `(row, col)`.
    #[inline]
    pub fn pixel_center(&self, row: usize, col: usize) -> Coord<f64> {
        self.vertex(col as f64 + 0.5, row as f64 + 0.5)
    }
}

/// Pixel types a raster band can be decoded into.
pub trait Sample: Copy + PartialEq + std::fmt::Debug {
    /// Stored for masked pixels when the file's nodata value has no exact
    /// representation in this type.
    const FILL: Self;

    /// Exact conversion, `None` when `value` cannot be held without loss.
    fn from_f64(value: f64) -> Option<Self>;
    fn to_f64(self) -> f64;
}

impl Sample for i32 {
    const FILL: Self = i32::MIN;

    #[inline]
    fn from_f64(value: f64) -> Option<Self> {
        let fits = value.fract() == 0.0 && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX);
        fits.then_some(value as i32)
    }

    #[inline] fn to_f64(self) -> f64 { f64::from(self) }
}

impl Sample for f64 {
    const FILL: Self = f64::NAN;

    #[inline] fn from_f64(value: f64) -> Option<Self> { Some(value) }
    #[inline] fn to_f64(self) -> f64 { self }
}

/// A single raster band with its georeferencing and nodata value.
#[derive(Debug, Clone)]
pub struct Raster<T> {
    data: Array2<T>, // rows x cols
    transform: GeoTransform,
    nodata: Option<f64>,
}

impl<T: Sample> Raster<T> {
    pub fn new(data: Array2<T>, transform: GeoTransform, nodata: Option<f64>) -> Self {
        Self { data, transform, nodata }
    }

    /// Read the first band of a single-band GeoTIFF.
    ///
    /// NaN and nodata pixels are masked before conversion to `T`. When the nodata
    /// value cannot be held by `T` (a float nodata on a label grid), masked pixels
    /// are stored as `T::FILL`, which becomes the raster's nodata. Valid pixels
    /// that `T` cannot hold exactly are an error.
    pub fn read(path: &Path) -> Result<Self> {
        let band = common::read_geotiff_band(path)?;
        let transform = match band.transform {
            Some(coeffs) => GeoTransform::new(coeffs),
            None => {
                warn!(path = %path.display(), "raster has no georeferencing, using pixel coordinates");
                GeoTransform::IDENTITY
            }
        };
        debug!(path = %path.display(), rows = band.height, cols = band.width, nodata = ?band.nodata, "read raster");

        let stored_nodata = band.nodata.and_then(T::from_f64);
        let fill = stored_nodata.unwrap_or(T::FILL);
        let mut masked = 0usize;
        let mut samples = Vec::with_capacity(band.samples.len());
        for (i, value) in band.samples.into_iter().enumerate() {
            if value.is_nan() || band.nodata == Some(value) {
                masked += 1;
                samples.push(fill);
                continue;
            }
            let sample = T::from_f64(value).with_context(|| format!(
                "Pixel ({}, {}) of {} holds {}, which is not a valid {} value",
                i / band.width, i % band.width, path.display(), value, std::any::type_name::<T>()
            ))?;
            ensure!(
                stored_nodata.is_some() || sample != fill,
                "Pixel ({}, {}) of {} holds {}, which is reserved for masked pixels",
                i / band.width, i % band.width, path.display(), value
            );
            samples.push(sample);
        }

        let nodata = match stored_nodata {
            Some(nodata) => Some(nodata.to_f64()),
            None if masked > 0 && !fill.to_f64().is_nan() => {
                debug!(path = %path.display(), nodata = ?band.nodata, fill = ?fill, masked, "nodata not representable, using fill value");
                Some(fill.to_f64())
            }
            None => None,
        };

        let data = Array2::from_shape_vec((band.height, band.width), samples)
            .with_context(|| format!("Invalid raster shape in {}", path.display()))?;

        Ok(Self::new(data, transform, nodata))
    }

    #[inline] pub fn rows(&self) -> usize { self.data.nrows() }

    #[inline] pub fn cols(&self) -> usize { self.data.ncols() }

    #[inline] pub fn data(&self) -> &Array2<T> { &self.data }

    #[inline] pub fn transform(&self) -> &GeoTransform { &self.transform }

    #[inline] pub fn nodata(&self) -> Option<f64> { self.nodata }

    /// False for NaN and for the nodata value.
    #[inline]
    pub fn is_valid(&self, value: T) -> bool {
        let v = value.to_f64();
        !v.is_nan() && self.nodata.is_none_or(|nodata| v != nodata)
    }

    /// Value of pixel `(row, col)`, or `None` if it is masked.
    #[inline]
    pub fn value(&self, row: usize, col: usize) -> Option<T> {
        let value = self.data[[row, col]];
        self.is_valid(value).then_some(value)
    }
}

impl Raster<i32> {
    /// Relabel every valid pixel; masked pixels keep their value.
    pub fn map_labels(&self, relabel: impl Fn(i32) -> i32) -> Self {
        let data = self.data.mapv(|v| if self.is_valid(v) { relabel(v) } else { v });
        Self::new(data, self.transform, self.nodata)
    }

    /// Write as a signed 32-bit GeoTIFF, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<()> {
        common::ensure_parent_exists(path)?;
        let data = self.data.iter().copied().collect::<Vec<_>>();
        common::write_geotiff::<colortype::GrayI32>(path, self.cols(), self.rows(), &data, &self.transform.coeffs(), self.nodata)
    }
}

impl Raster<f64> {
    /// Write as a 64-bit float GeoTIFF, replacing any existing file.
    pub fn write(&self, path: &Path) -> Result<()> {
        common::ensure_parent_exists(path)?;
        let data = self.data.iter().copied().collect::<Vec<_>>();
        common::write_geotiff::<colortype::Gray64Float>(path, self.cols(), self.rows(), &data, &self.transform.coeffs(), self.nodata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn labels() -> Raster<i32> {
        Raster::new(
            array![[1, 1, -99], [2, 2, 3]],
            GeoTransform::north_up(-70.0, 12.5, 0.5, 0.25),
            Some(-99.0),
        )
    }

    #[test]
    fn transform_maps_pixel_corners_and_centres() {
        let transform = GeoTransform::north_up(-70.0, 12.5, 0.5, 0.25);
        assert_eq!(transform.vertex(0.0, 0.0), Coord { x: -70.0, y: 12.5 });
        assert_eq!(transform.vertex(2.0, 4.0), Coord { x: -69.0, y: 11.5 });
        assert_eq!(transform.pixel_center(0, 0), Coord { x: -69.75, y: 12.375 });
    }

    #[test]
    fn nodata_and_nan_are_masked() {
        let raster = labels();
        assert_eq!(raster.value(0, 0), Some(1));
        assert_eq!(raster.value(0, 2), None);

        let values = Raster::new(array![[1.5, f64::NAN]], GeoTransform::IDENTITY, None);
        assert_eq!(values.value(0, 0), Some(1.5));
        assert_eq!(values.value(0, 1), None);
    }

    #[test]
    fn relabel_skips_masked_pixels() {
        let relabelled = labels().map_labels(|v| v * 10);
        assert_eq!(relabelled.data(), &array![[10, 10, -99], [20, 20, 30]]);
        assert_eq!(relabelled.nodata(), Some(-99.0));
    }

    #[test]
    fn write_then_read_label_raster() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/grid.tif");

        let raster = labels();
        raster.write(&path).unwrap();
        let read = Raster::<i32>::read(&path).unwrap();

        assert_eq!(read.data(), raster.data());
        assert_eq!(read.transform(), raster.transform());
        assert_eq!(read.nodata(), Some(-99.0));

        let as_values = Raster::<f64>::read(&path).unwrap();
        assert_eq!(as_values.value(1, 2), Some(3.0));
        assert_eq!(as_values.value(0, 2), None);
    }

    #[test]
    fn float_label_grid_keeps_its_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float_grid.tif");
        let nodata = f32::MIN as f64;

        Raster::<f64>::new(array![[1.0, 2.0], [nodata, 2.0], [f64::NAN, 1.0]], GeoTransform::IDENTITY, Some(nodata))
            .write(&path)
            .unwrap();
        let read = Raster::<i32>::read(&path).unwrap();

        assert_eq!(read.value(0, 0), Some(1));
        assert_eq!(read.value(1, 0), None);
        assert_eq!(read.value(2, 0), None);
        assert_eq!(read.value(2, 1), Some(1));
        assert_eq!(read.nodata(), Some(f64::from(i32::MIN)));
    }

    #[test]
    fn fractional_labels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fractional.tif");

        Raster::<f64>::new(array![[1.0, 1.5]], GeoTransform::IDENTITY, None)
            .write(&path)
            .unwrap();
        let err = Raster::<i32>::read(&path).unwrap_err();
        assert!(err.to_string().contains("not a valid i32 value"), "{err}");
    }

    #[test]
    fn out_of_range_labels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.tif");

        Raster::<f64>::new(array![[1.0, 5e9]], GeoTransform::IDENTITY, Some(-1.0))
            .write(&path)
            .unwrap();
        assert!(Raster::<i32>::read(&path).is_err());
    }

    #[test]
    fn ungeoreferenced_raster_uses_pixel_coordinates() {
        use std::{fs::File, io::BufWriter};
        use tiff::encoder::TiffEncoder;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        let file = File::create(&path).unwrap();
        TiffEncoder::new(BufWriter::new(file)).unwrap()
            .write_image::<colortype::GrayI32>(2, 1, &[4, 5])
            .unwrap();

        let read = Raster::<i32>::read(&path).unwrap();
        assert_eq!(read.transform(), &GeoTransform::IDENTITY);
        assert_eq!(read.data(), &array![[4, 5]]);
        assert_eq!(read.nodata(), None);
    }
}
