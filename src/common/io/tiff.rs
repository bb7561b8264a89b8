use std::{fs::File, io::{BufReader, BufWriter}, path::Path};

use anyhow::{bail, ensure, Context, Result};
use tiff::{
    decoder::{Decoder, DecodingResult, Limits},
    encoder::{colortype, TiffEncoder, TiffValue},
    tags::Tag,
    ColorType,
};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// GeoKey directory: geographic model, pixel-is-area, EPSG:4326.
const GEOKEYS_WGS84: [u16; 16] = [
    1, 1, 0, 3,
    1024, 0, 1, 2,
    1025, 0, 1, 1,
    2048, 0, 1, 4326,
];

/// Tag lookup must go through the exhaustive constructor so that GeoTIFF codes
/// resolve to the same key the decoder stores them under.
#[inline] fn geo_tag(code: u16) -> Tag { Tag::from_u16_exhaustive(code) }

/// A single decoded raster band with its georeferencing.
#[derive(Debug, Clone)]
pub(crate) struct GeoTiffBand {
    pub width: usize,
    pub height: usize,
    /// Row-major samples, `height * width` long.
    pub samples: Vec<f64>,
    /// GDAL-ordered affine transform, `None` when the file carries no model tags.
    pub transform: Option<[f64; 6]>,
    pub nodata: Option<f64>,
}

/// Decode the first band of a single-band (grayscale) GeoTIFF.
pub(crate) fn read_geotiff_band(path: &Path) -> Result<GeoTiffBand> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open raster: {}", path.display()))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .with_context(|| format!("Failed to read TIFF header: {}", path.display()))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    match decoder.colortype()? {
        ColorType::Gray(_) => {}
        other => bail!("Only single-band rasters are supported, {} has color type {:?}", path.display(), other),
    }

    let transform = read_transform(&mut decoder)?;
    let nodata = match decoder.find_tag(geo_tag(GDAL_NODATA))? {
        Some(value) => {
            let text = value.into_string()?;
            let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            Some(text.parse::<f64>()
                .with_context(|| format!("Invalid nodata value {:?} in {}", text, path.display()))?)
        }
        None => None,
    };

    let samples: Vec<f64> = match decoder.read_image()
        .with_context(|| format!("Failed to decode raster: {}", path.display()))?
    {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => bail!("Unsupported sample format in {}", path.display()),
    };

    let (width, height) = (width as usize, height as usize);
    ensure!(
        samples.len() == width * height,
        "Sample count mismatch in {}: got {}, expected {}",
        path.display(), samples.len(), width * height
    );

    Ok(GeoTiffBand { width, height, samples, transform, nodata })
}

/// Read the affine transform from ModelTransformation, or ModelPixelScale + ModelTiepoint.
fn read_transform<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<Option<[f64; 6]>> {
    if let Some(value) = decoder.find_tag(geo_tag(MODEL_TRANSFORMATION))? {
        let m = value.into_f64_vec()?;
        ensure!(m.len() >= 8, "ModelTransformationTag must hold 16 values, got {}", m.len());
        return Ok(Some([m[3], m[0], m[1], m[7], m[4], m[5]]));
    }

    let scale = decoder.find_tag(geo_tag(MODEL_PIXEL_SCALE))?;
    let tiepoint = decoder.find_tag(geo_tag(MODEL_TIEPOINT))?;
    match (scale, tiepoint) {
        (Some(scale), Some(tiepoint)) => {
            let scale = scale.into_f64_vec()?;
            let tie = tiepoint.into_f64_vec()?;
            ensure!(scale.len() >= 2, "ModelPixelScaleTag must hold 3 values, got {}", scale.len());
            ensure!(tie.len() >= 6, "ModelTiepointTag must hold 6 values, got {}", tie.len());
            let (sx, sy) = (scale[0], scale[1]);
            Ok(Some([tie[3] - tie[0] * sx, sx, 0.0, tie[4] + tie[1] * sy, 0.0, -sy]))
        }
        _ => Ok(None),
    }
}

/// Encode a single-band GeoTIFF (EPSG:4326) with sample type `C`, replacing any existing file.
pub(crate) fn write_geotiff<C>(
    path: &Path,
    width: usize,
    height: usize,
    data: &[C::Inner],
    transform: &[f64; 6],
    nodata: Option<f64>,
) -> Result<()>
where
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    ensure!(
        data.len() == width * height,
        "write_geotiff: data length {} does not match {}x{}", data.len(), width, height
    );

    let file = File::create(path)
        .with_context(|| format!("Failed to create raster: {}", path.display()))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let mut image = encoder.new_image::<C>(width as u32, height as u32)?;

    let [x0, a, b, y0, d, e] = *transform;
    let tags = image.encoder();
    if b == 0.0 && d == 0.0 {
        tags.write_tag(geo_tag(MODEL_PIXEL_SCALE), &[a, -e, 0.0][..])?;
        tags.write_tag(geo_tag(MODEL_TIEPOINT), &[0.0, 0.0, 0.0, x0, y0, 0.0][..])?;
    } else {
        let matrix = [
            a, b, 0.0, x0,
            d, e, 0.0, y0,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        tags.write_tag(geo_tag(MODEL_TRANSFORMATION), &matrix[..])?;
    }
    tags.write_tag(geo_tag(GEO_KEY_DIRECTORY), &GEOKEYS_WGS84[..])?;
    if let Some(nodata) = nodata {
        tags.write_tag(geo_tag(GDAL_NODATA), format!("{nodata}").as_str())?;
    }

    image.write_data(data)
        .with_context(|| format!("Failed to write raster data: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geotiff_keeps_georeferencing_and_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        let transform = [-70.1, 0.001, 0.0, 12.7, 0.0, -0.001];
        let data = [1, 1, 2, -99, 2, 2];

        write_geotiff::<colortype::GrayI32>(&path, 3, 2, &data, &transform, Some(-99.0)).unwrap();
        let band = read_geotiff_band(&path).unwrap();

        assert_eq!((band.width, band.height), (3, 2));
        assert_eq!(band.samples, vec![1.0, 1.0, 2.0, -99.0, 2.0, 2.0]);
        assert_eq!(band.nodata, Some(-99.0));

        let read = band.transform.unwrap();
        for (got, want) in read.iter().zip(transform.iter()) {
            assert!((got - want).abs() < 1e-12, "{got} != {want}");
        }
    }

    #[test]
    fn rotated_transform_uses_model_transformation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotated.tif");
        let transform = [10.0, 1.0, 0.5, 20.0, 0.25, -1.0];

        write_geotiff::<colortype::GrayI32>(&path, 2, 2, &[1, 2, 3, 4], &transform, None).unwrap();
        let band = read_geotiff_band(&path).unwrap();

        assert_eq!(band.transform, Some(transform));
        assert_eq!(band.nodata, None);
    }

    #[test]
    fn float_rasters_keep_fractions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("area.tif");
        let transform = [0.0, 0.5, 0.0, 1.0, 0.0, -0.5];

        write_geotiff::<colortype::Gray64Float>(&path, 2, 1, &[0.25, -1.0], &transform, Some(-1.0)).unwrap();
        let band = read_geotiff_band(&path).unwrap();

        assert_eq!(band.samples, vec![0.25, -1.0]);
        assert_eq!(band.nodata, Some(-1.0));
    }

    #[test]
    fn mismatched_data_length_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_geotiff::<colortype::GrayI32>(&dir.path().join("x.tif"), 2, 2, &[1, 2, 3], &[0.0, 1.0, 0.0, 0.0, 0.0, -1.0], None)
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn multi_band_rasters_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.tif");
        let file = File::create(&path).unwrap();
        TiffEncoder::new(BufWriter::new(file)).unwrap()
            .write_image::<colortype::RGB8>(2, 1, &[1, 2, 3, 4, 5, 6])
            .unwrap();

        let err = read_geotiff_band(&path).unwrap_err();
        assert!(err.to_string().contains("single-band"), "{err}");
    }

    #[test]
    fn plain_tiff_has_no_transform() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.tif");
        let file = File::create(&path).unwrap();
        TiffEncoder::new(BufWriter::new(file)).unwrap()
            .write_image::<colortype::Gray32Float>(2, 1, &[0.5, 1.5])
            .unwrap();

        let band = read_geotiff_band(&path).unwrap();
        assert_eq!(band.samples, vec![0.5, 1.5]);
        assert_eq!(band.transform, None);
        assert_eq!(band.nodata, None);
    }

    #[test]
    fn missing_raster_reports_path() {
        let err = read_geotiff_band(Path::new("/nowhere/grid.tif")).unwrap_err();
        assert!(err.to_string().contains("grid.tif"));
    }
}
