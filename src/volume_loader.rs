use crate::{enums::SortBy, volume::Volume};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use ndarray::{Array2, Array3, s};
use std::{cmp::Ordering, fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

type DicomFile = FileDicomObject<InMemDicomObject>;

/// A decoded frame together with the key it is sorted by.
#[derive(Debug)]
struct OrderedImage {
    order: Option<f32>,
    pixels: Array2<u16>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found, dimensions are inconsistent
    /// or no object carries pixel spacing and slice thickness
    pub fn load_from_dicom_objects(
        dicom_objects: &[DicomFile],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let start = web_time::Instant::now();
        let mut images: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_ordered_image(dicom_object, sort_by))
            .collect();

        if images.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        let skipped = dicom_objects.len() - images.len();
        if skipped > 0 {
            tracing::warn!(skipped, "skipped objects without decodable pixel data");
        }

        Self::sort_images(&mut images, sort_by);
        let volume_array = Self::build_volume_array(&images)?;
        let spacing = Self::get_spacing(dicom_objects).ok_or(VolumeLoaderError::MissingSpacing)?;

        tracing::debug!(
            elapsed = ?start.elapsed(),
            dim = ?volume_array.dim(),
            ?spacing,
            "loaded volume"
        );
        Ok(Volume::new(volume_array, spacing))
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<Volume, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        tracing::debug!(files = paths.len(), dir = %path.as_ref().display(), "reading directory");

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_ordered_image(dicom_object: &DicomFile, sort_by: SortBy) -> Option<OrderedImage> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let pixels = Self::decode_image(dicom_object)?;
        Some(OrderedImage { order, pixels })
    }

    /// The outer `Option` rejects the object, the inner one is a missing key.
    fn get_sort_order(dicom_object: &DicomFile, sort_by: SortBy) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    /// Decodes the first frame of the first sample as u16.
    fn decode_image(dicom_object: &DicomFile) -> Option<Array2<u16>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
        pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn sort_images(images: &mut [OrderedImage], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            images.sort_by(|a, b| a.order.partial_cmp(&b.order).unwrap_or(Ordering::Equal));
        }

        // Patient z grows toward the head; slices are stored feet last.
        if matches!(sort_by, SortBy::ImagePositionPatient) {
            images.reverse();
        }
    }

    /// Stacks the frames along depth. All frames must share their shape.
    fn build_volume_array(images: &[OrderedImage]) -> Result<Array3<u16>, VolumeLoaderError> {
        let first = images.first().ok_or(VolumeLoaderError::NoValidImages)?;
        let (height, width) = first.pixels.dim();
        if images.iter().any(|img| img.pixels.dim() != (height, width)) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }

        let mut volume = Array3::<u16>::zeros((images.len(), height, width));
        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&image.pixels);
        }
        Ok(volume)
    }

    fn get_spacing(dicom_objects: &[DicomFile]) -> Option<(f32, f32, f32)> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = dicom_object
                .element(tags::PIXEL_SPACING)
                .ok()?
                .to_multi_float32()
                .ok()?;

            let slice_thickness = dicom_object
                .element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float32()
                .ok()?;

            let row_spacing = *pixel_spacing.first()?;
            let column_spacing = *pixel_spacing.get(1)?;
            Some((row_spacing, column_spacing, slice_thickness))
        })
    }
}
